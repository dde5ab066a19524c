use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{Error as SynError, Ident, Result as SynResult};

/// The lifecycle a type declares through `#[injectable(...)]`.
#[derive(Debug)]
pub enum AttributeData {
    Default,
    Lifecycle { policy: Ident },
}

impl AttributeData {
    pub fn lifecycle_tokens(&self) -> TokenStream2 {
        let Self::Lifecycle { policy } = self else {
            return TokenStream2::new();
        };
        let variant = match policy.to_string().as_str() {
            "transient" => quote! { Transient },
            "singleton" => quote! { Singleton },
            "thread" => quote! { Thread },
            _ => quote! { ActivationScope },
        };
        quote! { .lifecycle(::ioc_kernel::behavior::LifecyclePolicy::#variant) }
    }
}

pub fn parse_attributes(attr: TokenStream) -> SynResult<AttributeData> {
    if attr.is_empty() {
        return Ok(AttributeData::Default);
    }

    let tokens = attr.to_string();
    let policy = tokens.trim();
    match policy {
        "transient" | "singleton" | "thread" | "activation_scope" => Ok(AttributeData::Lifecycle {
            policy: Ident::new(policy, Span::call_site()),
        }),
        _ => Err(SynError::new(
            Span::call_site(),
            "expects one of `transient`, `singleton`, `thread` or `activation_scope`",
        )),
    }
}
