pub mod achievement;
pub mod game;
pub mod tracking;

/// Implements the conversions shared by every integer id newtype
#[macro_export]
macro_rules! impl_entity_id {
    ($id:ident) => {
        impl From<i64> for $id {
            fn from(value: i64) -> Self {
                $id(value)
            }
        }

        impl From<$id> for i64 {
            fn from(value: $id) -> Self {
                value.0
            }
        }

        impl core::fmt::Display for $id {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}
