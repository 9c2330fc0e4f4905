/// Declares a struct with one `bool` per Vulkan extension, keyed by the
/// extension's `CStr` name in ash.
#[macro_export]
macro_rules! impl_extensions {
    (
        $(#[$meta:meta])*
        $vis:vis struct $ident:ident {
            $($field:ident => $name:expr,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        $vis struct $ident {
            $(pub $field: bool,)*
        }

        impl $ident {
            /// Marks every known extension found among `names`. Unknown names
            /// are ignored.
            pub fn from_names<'a>(names: impl IntoIterator<Item = &'a std::ffi::CStr>) -> Self {
                let mut extensions = Self::default();
                for name in names {
                    $(extensions.$field |= name == $name;)*
                }
                extensions
            }

            /// Names of the enabled extensions.
            pub fn names(&self) -> impl Iterator<Item = &'static std::ffi::CStr> {
                [$(($name, self.$field)),*]
                    .into_iter()
                    .filter(|(_, enabled)| *enabled)
                    .map(|(name, _)| name)
            }

            pub const fn is_empty(&self) -> bool {
                !($(self.$field)||*)
            }

            /// Extensions enabled in `self` that `supported` lacks.
            pub const fn missing_from(&self, supported: &Self) -> Self {
                Self {
                    $($field: self.$field && !supported.$field,)*
                }
            }
        }

        impl std::fmt::Display for $ident {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                let mut list = f.debug_list();
                for name in self.names() {
                    list.entry(&name.to_string_lossy());
                }
                list.finish()
            }
        }
    };
}

/// Declares a plain enum together with its two-way mapping onto an ash enum.
/// Vulkan values without a variant map to `None`.
#[macro_export]
macro_rules! vk_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $ident:ident: $vk_type:ty {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident => $vk_value:ident,
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $ident {
            $($(#[$variant_meta])* $variant,)*
        }

        impl $ident {
            pub const fn from_vk(value: $vk_type) -> Option<Self> {
                $(
                    if value.as_raw() == <$vk_type>::$vk_value.as_raw() {
                        return Some(Self::$variant);
                    }
                )*
                None
            }

            pub const fn to_vk(self) -> $vk_type {
                match self {
                    $(Self::$variant => <$vk_type>::$vk_value,)*
                }
            }
        }
    };
}
