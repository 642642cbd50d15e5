/// Generates a non-exhaustive enum of well-known AMI field names.
///
/// Produces the enum plus `as_str()`, `Display`, `AsRef<str>` and a
/// case-insensitive `FromStr`. The parse error type is declared by the caller.
///
/// ```ignore
/// define_field_enum! {
///     error_type: ParseMyFieldError,
///     /// Fields of some catalog.
///     pub enum MyField {
///         Channel => "Channel",
///         Uniqueid => "Uniqueid",
///     }
/// }
/// ```
macro_rules! define_field_enum {
    (
        error_type: $Err:ident,
        $(#[$enum_meta:meta])*
        $vis:vis enum $Name:ident {
            $(
                $(#[$var_meta:meta])*
                $variant:ident => $wire:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        #[allow(missing_docs)]
        $vis enum $Name {
            $(
                $(#[$var_meta])*
                $variant,
            )+
        }

        impl $Name {
            /// Canonical spelling on the wire.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $Name::$variant => $wire, )+
                }
            }

            /// Every variant, in declaration order.
            pub fn all() -> &'static [$Name] {
                &[ $( $Name::$variant, )+ ]
            }
        }

        impl std::fmt::Display for $Name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl AsRef<str> for $Name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl std::str::FromStr for $Name {
            type Err = $Err;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case($wire) {
                        return Ok($Name::$variant);
                    }
                )+
                Err($Err(s.to_string()))
            }
        }
    };
}
