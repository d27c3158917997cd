//! ---
//! fdh_section: "03-logging"
//! fdh_subsection: "module"
//! fdh_type: "source"
//! fdh_scope: "code"
//! fdh_description: "Suite-aware logging macros."
//! fdh_version: "v0.0.0-prealpha"
//! fdh_owner: "tbd"
//! ---

/// Shared expansion for the level-specific macros below.
#[doc(hidden)]
#[macro_export]
macro_rules! __fdh_event {
    ($level:expr, $ctx:expr, $($arg:tt)+) => {{
        let ctx = &$ctx;
        tracing::event!(
            $level,
            suite = ctx.suite.unwrap_or(""),
            group = ctx.group.unwrap_or(""),
            case = ctx.case.unwrap_or(""),
            message = %format_args!($($arg)+)
        );
    }};
}

/// Emit an informational log enriched with suite context.
#[macro_export]
macro_rules! fdh_info {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__fdh_event!(tracing::Level::INFO, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__fdh_event!(tracing::Level::INFO, $crate::SuiteContext::default(), $($arg)+)
    };
}

/// Emit a warning enriched with suite context.
#[macro_export]
macro_rules! fdh_warn {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__fdh_event!(tracing::Level::WARN, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__fdh_event!(tracing::Level::WARN, $crate::SuiteContext::default(), $($arg)+)
    };
}

/// Emit an error log enriched with suite context.
#[macro_export]
macro_rules! fdh_error {
    (context = $ctx:expr, $($arg:tt)+) => {
        $crate::__fdh_event!(tracing::Level::ERROR, $ctx, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::__fdh_event!(tracing::Level::ERROR, $crate::SuiteContext::default(), $($arg)+)
    };
}
