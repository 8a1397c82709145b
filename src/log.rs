//! Logging shims
//!
//! - `defmt` feature: forwards to the `defmt` macros
//! - Host tests: `println!` with a level prefix
//! - Anything else: no-op, the arguments are still type-checked
//!
//! Only `{}` / `{:?}` placeholders are used so the same format string is valid
//! for both `defmt` and `core::fmt`.

macro_rules! log_at {
    ($defmt:ident, $prefix:literal, $($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::$defmt!($($arg)*);

        #[cfg(all(not(feature = "defmt"), test))]
        ::std::println!("{} {}", $prefix, ::core::format_args!($($arg)*));

        #[cfg(all(not(feature = "defmt"), not(test)))]
        {
            let _ = ::core::format_args!($($arg)*);
        }
    }};
}

macro_rules! log_trace {
    ($($arg:tt)*) => { log_at!(trace, "[TRACE]", $($arg)*) };
}

macro_rules! log_debug {
    ($($arg:tt)*) => { log_at!(debug, "[DEBUG]", $($arg)*) };
}

macro_rules! log_info {
    ($($arg:tt)*) => { log_at!(info, "[INFO] ", $($arg)*) };
}

macro_rules! log_warn {
    ($($arg:tt)*) => { log_at!(warn, "[WARN] ", $($arg)*) };
}

#[allow(unused_macros)]
macro_rules! log_error {
    ($($arg:tt)*) => { log_at!(error, "[ERROR]", $($arg)*) };
}
