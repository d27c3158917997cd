//! ---
//! fdh_section: "15-testing"
//! fdh_subsection: "fixtures"
//! fdh_type: "source"
//! fdh_scope: "code"
//! fdh_description: "Fixture process that listens on a port until terminated."
//! fdh_version: "v0.0.0-prealpha"
//! fdh_owner: "tbd"
//! ---
//! Stands in for the emulator in teardown tests: `fdh-port-holder <port>`.

use std::net::TcpListener;

fn main() -> anyhow::Result<()> {
    let port: u16 = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: fdh-port-holder <port>"))?
        .parse()?;
    let listener = TcpListener::bind(("127.0.0.1", port))?;
    for stream in listener.incoming() {
        drop(stream);
    }
    Ok(())
}
