// Core traits for the Trellis application skeleton

use std::any::TypeId;

/// Trait for types that can be provided by the DI container.
///
/// Blanket-implemented for every `Send + Sync + 'static` type, so services
/// only need to be registered, never annotated.
pub trait Provider: Send + Sync + 'static {
    /// Returns the TypeId of the provider
    fn provider_type_id(&self) -> TypeId {
        TypeId::of::<Self>()
    }

    /// Returns the type name of the provider
    fn provider_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<T: Send + Sync + 'static> Provider for T {}
