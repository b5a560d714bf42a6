/// Define an enumeration with known variants and an unknown representation.
///
/// Header fields such as the IP protocol number are only partially standardized. Parsing keeps
/// values it does not recognize instead of failing, and converts to and from the underlying
/// integer representation.
///
/// ```
/// # use toe::enum_with_unknown;
/// enum_with_unknown! {
///     pub enum IpVersion(u8) {
///         IpV4 = 4,
///         IpV6 = 6,
///     }
/// }
/// assert_eq!(IpVersion::from(4), IpVersion::IpV4);
/// assert_eq!(u8::from(IpVersion::Unknown(9)), 9);
/// ```
#[macro_export]
macro_rules! enum_with_unknown {
    (
        $( #[$enum_attr:meta] )*
        pub enum $name:ident($ty:ty) {
            $( $( #[$variant_attr:meta] )* $variant:ident = $value:expr ),+ $(,)*
        }
    ) => {
        #[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
        $( #[$enum_attr] )*
        pub enum $name {
            $(
              $( #[$variant_attr] )*
              $variant
            ),*,
            /// A value that has no assigned meaning here.
            Unknown($ty)
        }

        impl ::core::convert::From<$ty> for $name {
            fn from(value: $ty) -> Self {
                match value {
                    $( $value => $name::$variant ),*,
                    other => $name::Unknown(other)
                }
            }
        }

        impl ::core::convert::From<$name> for $ty {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => $value ),*,
                    $name::Unknown(other) => other
                }
            }
        }
    }
}

#[cfg(feature = "log")]
#[macro_use]
mod log {
    macro_rules! net_log {
        (trace, $($arg:expr),*) => { ::log::trace!($($arg),*) };
        (debug, $($arg:expr),*) => { ::log::debug!($($arg),*) };
        (warn, $($arg:expr),*) => { ::log::warn!($($arg),*) };
        (error, $($arg:expr),*) => { ::log::error!($($arg),*) };
    }
}

#[cfg(not(feature = "log"))]
#[macro_use]
mod log {
    macro_rules! net_log {
        ($level:ident, $($arg:expr),*) => { { $( let _ = &$arg; )* } }
    }
}

macro_rules! net_trace {
    ($($arg:expr),*) => (net_log!(trace, $($arg),*));
}

macro_rules! net_debug {
    ($($arg:expr),*) => (net_log!(debug, $($arg),*));
}

macro_rules! net_warn {
    ($($arg:expr),*) => (net_log!(warn, $($arg),*));
}

macro_rules! net_error {
    ($($arg:expr),*) => (net_log!(error, $($arg),*));
}
