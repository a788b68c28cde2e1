// Procedural macros for Trellis event listeners
// Declares class methods as handlers for a given event kind

use proc_macro::TokenStream;

mod event_handlers;

/// Declares the `#[on_event]` methods of an impl block as event listeners.
///
/// Each annotated method must take `&self` and exactly one `&E` where `E`
/// is an event type. The macro implements `DeclaresListeners` for the type
/// and submits every method to the global listener registry.
///
/// ```rust,ignore
/// #[event_handlers]
/// impl AuditTrail {
///     #[on_event]
///     fn on_user_created(&self, event: &UserCreated) {
///         self.record(&event.data);
///     }
/// }
/// ```
///
/// Use `#[event_handlers(crate = path::to::trellis_events)]` when the
/// events crate is reachable under another name.
#[proc_macro_attribute]
pub fn event_handlers(attr: TokenStream, item: TokenStream) -> TokenStream {
    event_handlers::event_handlers_impl(attr, item)
}

/// Marks a method as an event listener inside `#[event_handlers]`
#[proc_macro_attribute]
pub fn on_event(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let item = proc_macro2::TokenStream::from(item);
    TokenStream::from(quote::quote! {
        ::core::compile_error!("#[on_event] can only be used on methods inside an #[event_handlers] impl block");
        #item
    })
}
