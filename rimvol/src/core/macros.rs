// SPDX-License-Identifier: MIT

/// Wires the layered error enums together.
///
/// - `top`: every listed layer converts into the top-level variant.
/// - `str_into`: `&'static str` converts into `Other(..)` of every listed layer
///   and of the top-level error.
/// - `sub`: inter-layer conversions (`Source => [Target::Variant, ..]`).
#[macro_export]
macro_rules! fs_error_wiring {
    (
        top => $top:ident {
            $($top_src:ty : $top_variant:ident),+ $(,)?
        },
        str_into => [ $($str_tgt:ident),* $(,)? ],
        sub => {
            $($src_sub:ty => [ $($dst_sub:ident::$dst_variant:ident),+ ] ),* $(,)?
        } $(,)?
    ) => {
        $(
            $crate::fs_error_wiring!(@from $top_src => $top::$top_variant);
        )+

        $(
            $crate::fs_error_wiring!(@str $str_tgt);
        )*
        $crate::fs_error_wiring!(@str $top);

        $(
            $(
                $crate::fs_error_wiring!(@from $src_sub => $dst_sub::$dst_variant);
            )+
        )*
    };

    (@from $src:ty => $dst:ident::$variant:ident) => {
        impl From<$src> for $dst {
            #[inline]
            fn from(e: $src) -> Self {
                $dst::$variant(e)
            }
        }
    };

    (@str $dst:ident) => {
        impl From<&'static str> for $dst {
            #[inline]
            fn from(msg: &'static str) -> Self {
                $dst::Other(msg)
            }
        }
    };
}

/// Returns early with `$err.into()` when `$cond` does not hold.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr $(,)?) => {
        if !$cond {
            return Err($err.into());
        }
    };
}

/// Returns early with `$err.into()`.
#[macro_export]
macro_rules! bail {
    ($err:expr $(,)?) => {
        return Err($err.into())
    };
}
