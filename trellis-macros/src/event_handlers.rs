use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{format_ident, quote};
use syn::{
    Attribute, FnArg, Ident, ImplItem, ImplItemFn, ItemImpl, Path, Type, parse_macro_input,
    parse_quote, spanned::Spanned,
};

/// A method annotated with `#[on_event]`
struct HandlerInfo {
    method: Ident,
    event: Type,
}

/// Whether the attribute is `#[on_event]`
fn is_on_event(attr: &Attribute) -> bool {
    attr.path().is_ident("on_event")
}

/// Remove `#[on_event]` from a method's attributes
fn strip_on_event_attrs(attrs: &[Attribute]) -> Vec<Attribute> {
    attrs.iter().filter(|attr| !is_on_event(attr)).cloned().collect()
}

/// Short name of the impl's self type, for error messages
fn class_name(ty: &Type) -> String {
    match ty {
        Type::Path(type_path) => type_path
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string())
            .unwrap_or_default(),
        other => quote!(#other).to_string(),
    }
}

/// Check a handler signature and pull out its event type
fn extract_handler(class: &str, method: &ImplItemFn) -> syn::Result<HandlerInfo> {
    let name = &method.sig.ident;
    let fail = |span: Span, reason: &str| {
        syn::Error::new(
            span,
            format!(
                "Could not set method {}.{}() as an event handler: {}",
                class, name, reason
            ),
        )
    };

    if let Some(asyncness) = &method.sig.asyncness {
        return Err(fail(
            asyncness.span(),
            "handlers are synchronous, return `Outcome::pending(..)` for deferred work",
        ));
    }
    if !method.sig.generics.params.is_empty() {
        return Err(fail(method.sig.generics.span(), "handlers cannot be generic"));
    }

    let mut inputs = method.sig.inputs.iter();
    match inputs.next() {
        Some(FnArg::Receiver(receiver))
            if receiver.reference.is_some() && receiver.mutability.is_none() => {}
        Some(other) => return Err(fail(other.span(), "handlers must take `&self`")),
        None => return Err(fail(method.sig.span(), "handlers must take `&self`")),
    }

    let event = match inputs.next() {
        Some(FnArg::Typed(param)) => param,
        Some(FnArg::Receiver(receiver)) => {
            return Err(fail(receiver.span(), "event parameter #0 is not a class type"));
        }
        None => return Err(fail(method.sig.span(), "missing event parameter #0")),
    };

    let event_ty = match event.ty.as_ref() {
        Type::Reference(reference) if reference.mutability.is_none() => {
            match reference.elem.as_ref() {
                Type::Path(path) if path.qself.is_none() => Type::Path(path.clone()),
                _ => {
                    return Err(fail(
                        event.ty.span(),
                        "event parameter #0 is not a class type",
                    ));
                }
            }
        }
        Type::Path(_) => {
            return Err(fail(
                event.ty.span(),
                "event parameter #0 must be taken by shared reference",
            ));
        }
        _ => return Err(fail(event.ty.span(), "event parameter #0 is not a class type")),
    };

    if let Some(extra) = inputs.next() {
        return Err(fail(
            extra.span(),
            "handlers take exactly one event parameter",
        ));
    }

    Ok(HandlerInfo {
        method: name.clone(),
        event: event_ty,
    })
}

/// Parse `crate = path`; defaults to `::trellis_events`
fn parse_crate_path(attr: TokenStream) -> syn::Result<Path> {
    let mut krate: Path = parse_quote!(::trellis_events);
    if attr.is_empty() {
        return Ok(krate);
    }

    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("crate") {
            krate = meta.value()?.parse()?;
            Ok(())
        } else {
            Err(meta.error("unsupported event_handlers argument, expected `crate = path`"))
        }
    });
    syn::parse::Parser::parse(parser, attr)?;
    Ok(krate)
}

pub fn event_handlers_impl(attr: TokenStream, item: TokenStream) -> TokenStream {
    let krate = match parse_crate_path(attr) {
        Ok(path) => path,
        Err(err) => return err.to_compile_error().into(),
    };
    let input = parse_macro_input!(item as ItemImpl);

    if input.trait_.is_some() {
        return syn::Error::new(
            input.impl_token.span,
            "#[event_handlers] must be placed on an inherent impl block",
        )
        .to_compile_error()
        .into();
    }
    if !input.generics.params.is_empty() {
        return syn::Error::new(
            input.generics.span(),
            "#[event_handlers] cannot be used on a generic impl block",
        )
        .to_compile_error()
        .into();
    }

    let class_type = &input.self_ty;
    let class = class_name(class_type);

    let mut handlers: Vec<HandlerInfo> = Vec::new();
    let mut modified_items: Vec<ImplItem> = Vec::new();
    let mut errors: Option<syn::Error> = None;

    for item in &input.items {
        match item {
            ImplItem::Fn(method) if method.attrs.iter().any(is_on_event) => {
                match extract_handler(&class, method) {
                    Ok(info) => handlers.push(info),
                    Err(err) => match errors.as_mut() {
                        Some(all) => all.combine(err),
                        None => errors = Some(err),
                    },
                }

                let mut modified_method = method.clone();
                modified_method.attrs = strip_on_event_attrs(&method.attrs);
                modified_items.push(ImplItem::Fn(modified_method));
            }
            other => modified_items.push(other.clone()),
        }
    }

    if let Some(err) = errors {
        return err.to_compile_error().into();
    }

    let registrations = handlers.iter().map(|handler| {
        let method = &handler.method;
        let method_str = method.to_string();
        let event = &handler.event;
        quote! {
            registry.register::<#class_type, #event, _, _>(#method_str, #class_type::#method);
        }
    });

    let declarations = handlers.iter().map(|handler| {
        let method = &handler.method;
        let method_str = method.to_string();
        let event = &handler.event;
        let binder = format_ident!("__bind_{}", method);
        quote! {
            const _: () = {
                fn #binder(
                    instance: #krate::SharedInstance,
                ) -> ::core::option::Option<#krate::Listener> {
                    #krate::Listener::from_instance::<#class_type, #event, _, _>(
                        instance,
                        #class_type::#method,
                    )
                }

                #krate::inventory::submit! {
                    #krate::ListenerDeclaration::new::<#class_type, #event>(#method_str, #binder)
                }
            };
        }
    });

    let attrs = &input.attrs;
    let expanded = quote! {
        #(#attrs)*
        impl #class_type {
            #(#modified_items)*
        }

        impl #krate::DeclaresListeners for #class_type {
            #[allow(unused_variables)]
            fn declare_listeners(registry: &mut #krate::ListenerRegistry) {
                #(#registrations)*
            }
        }

        #(#declarations)*
    };

    TokenStream::from(expanded)
}
