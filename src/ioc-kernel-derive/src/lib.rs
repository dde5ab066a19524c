mod attrs;
mod impls;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use syn::Result as SynResult;

/// Describes the annotated `impl` block's type as an `Injectable`.
///
/// Inside the block:
///
/// - `#[inject]` on an associated function marks the injection constructor,
///   `#[constructor]` adds an unmarked candidate.
/// - `#[inject]` on a `&mut self` method makes it an injected method.
/// - `#[named("...")]` on a parameter overrides its target name.
/// - `#[start]`, `#[stop]` and `#[dispose]` register lifecycle hooks.
/// - `#[intercept("name", order)]` marks a method for the named interceptor.
///
/// Parameters of type `Arc<S>` and `Option<Arc<S>>` receive service objects,
/// any other `T` or `Option<T>` receives a cloned value.
#[proc_macro_attribute]
pub fn injectable(attr: TokenStream, item: TokenStream) -> TokenStream {
    match injectable_impl(attr, item) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.into_compile_error().into(),
    }
}

fn injectable_impl(attr: TokenStream, item: TokenStream) -> SynResult<TokenStream2> {
    let attr_data = attrs::parse_attributes(attr)?;
    let expanded = impls::expand_implementation(item, attr_data)?;
    Ok(expanded)
}
