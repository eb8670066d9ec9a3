//! Utility macros for reducing state-extraction boilerplate.

/// Implements `FromRef<AppState>` for one field, so route handlers can
/// take the field type directly as an extractor argument.
#[macro_export]
macro_rules! impl_from_ref {
    ($type:ty, $field:ident) => {
        impl axum::extract::FromRef<$crate::state::AppState> for $type {
            fn from_ref(state: &$crate::state::AppState) -> Self {
                state.$field.clone()
            }
        }
    };
}
