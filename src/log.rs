//! Logging interface, contingent on the hidden `__log` feature, and on
//! `defmt-03`
//!
//! Only enable `__log` when debugging the coordinator or a driver. Without
//! either feature, the macros only type check their arguments.
//! Arguments must be printable by both backends: integers, `&str`, and
//! types that implement `Display` and `defmt::Format`.

macro_rules! debug {
    ($($args:tt)*) => {
        #[cfg(feature = "__log")]
        ::__log::debug!($($args)*);
        #[cfg(feature = "defmt-03")]
        ::defmt::debug!($($args)*);
        #[cfg(not(any(feature = "__log", feature = "defmt-03")))]
        let _ = ::core::format_args!($($args)*);
    };
}

macro_rules! warn {
    ($($args:tt)*) => {
        #[cfg(feature = "__log")]
        ::__log::warn!($($args)*);
        #[cfg(feature = "defmt-03")]
        ::defmt::warn!($($args)*);
        #[cfg(not(any(feature = "__log", feature = "defmt-03")))]
        let _ = ::core::format_args!($($args)*);
    };
}

macro_rules! error {
    ($($args:tt)*) => {
        #[cfg(feature = "__log")]
        ::__log::error!($($args)*);
        #[cfg(feature = "defmt-03")]
        ::defmt::error!($($args)*);
        #[cfg(not(any(feature = "__log", feature = "defmt-03")))]
        let _ = ::core::format_args!($($args)*);
    };
}
