use proc_macro::TokenStream;

use proc_macro2::Ident;
use quote::quote;
use syn::{DeriveInput, LitStr};

#[proc_macro_derive(IntegrationEvent, attributes(integration_event))]
/// Implements `txoutbox::IntegrationEvent` for a struct or enum.
///
/// The discriminator stored in the outbox defaults to the type name and can be overridden with
/// `#[integration_event(name = "employees.hired")]`. Pick a name once and never change it: rows
/// already sitting in the outbox are decoded by it.
pub fn derive_integration_event(item: TokenStream) -> TokenStream {
    let derive_input: DeriveInput = syn::parse_macro_input!(item as DeriveInput);

    let ident: Ident = derive_input.ident;
    let (impl_generics, ty_generics, where_clause) = derive_input.generics.split_for_impl();

    let mut name: LitStr = LitStr::new(&ident.to_string(), ident.span());

    for attr in derive_input.attrs.iter().filter(|attr| attr.path().is_ident("integration_event")) {
        let parsed = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                name = meta.value()?.parse()?;
                Ok(())
            } else {
                Err(meta.error("unsupported integration_event attribute, expected `name`"))
            }
        });

        if let Err(error) = parsed {
            return error.to_compile_error().into();
        }
    }

    quote!(
        impl #impl_generics ::txoutbox::IntegrationEvent for #ident #ty_generics #where_clause {
            const EVENT_TYPE: &'static str = #name;
        }
    )
    .into()
}
