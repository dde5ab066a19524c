use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{quote, ToTokens};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::token::Comma;
use syn::visit_mut::{self, VisitMut};
use syn::{
    Attribute, Error as SynError, Expr, ExprLit, FnArg, GenericArgument, Ident, ImplItem,
    ImplItemFn, ItemImpl, Lit, LitStr, Pat, PathArguments, Receiver, Result as SynResult,
    ReturnType, Signature, Type, TypePath,
};

use crate::attrs::AttributeData;

const CUSTOM_ATTRIBUTES: &[&str] = &[
    "inject",
    "constructor",
    "named",
    "intercept",
    "start",
    "stop",
    "dispose",
];

#[derive(Debug)]
struct FunctionData {
    identifier: Ident,
    marked: bool,
    arguments: Vec<ArgumentData>,
    return_type: ReturnTypeData,
}

#[derive(Debug)]
struct ArgumentData {
    span: Span,
    name: LitStr,
    kind: ArgumentKind,
}

#[derive(Debug)]
enum ArgumentKind {
    Arc(Type),
    OptionalArc(Type),
    Value(Type),
    OptionalValue(Type),
}

#[derive(Debug)]
enum ReturnTypeData {
    Infallible,
    Result,
}

#[derive(Debug, Clone, Copy)]
enum HookKind {
    Start,
    Stop,
    Dispose,
}

#[derive(Debug)]
struct HookData {
    kind: HookKind,
    identifier: Ident,
    return_type: ReturnTypeData,
}

#[derive(Debug)]
struct InterceptorData {
    method: Ident,
    interceptor: LitStr,
    order: Expr,
}

#[derive(Debug, Default)]
struct ImplementationData {
    constructors: Vec<FunctionData>,
    methods: Vec<FunctionData>,
    hooks: Vec<HookData>,
    interceptors: Vec<InterceptorData>,
}

struct AttributeRemovalVisitor;

impl AttributeRemovalVisitor {
    fn is_custom_attribute(attr: &Attribute) -> bool {
        attribute_name(attr).is_some_and(|name| CUSTOM_ATTRIBUTES.contains(&name.as_str()))
    }
}

impl VisitMut for AttributeRemovalVisitor {
    fn visit_attributes_mut(&mut self, attrs: &mut Vec<Attribute>) {
        attrs.retain(|attr| !Self::is_custom_attribute(attr));
        attrs
            .iter_mut()
            .for_each(|attr| visit_mut::visit_attribute_mut(self, attr));
    }
}

pub fn expand_implementation(
    impls: TokenStream,
    attr_data: AttributeData,
) -> SynResult<TokenStream2> {
    let mut impls = match syn::parse::<ItemImpl>(impls) {
        Ok(impls) => impls,
        Err(err) => {
            return Err(SynError::new(
                err.span(),
                "`#[injectable]` should be annotated on the `impl` block",
            ))
        }
    };
    if let Some((_, path, _)) = &impls.trait_ {
        return Err(SynError::new(
            path.span(),
            "`#[injectable]` should be annotated on an inherent `impl` block",
        ));
    }

    let impl_data = parse_items(&impls.items, impls.span())?;
    let expanded = expand_injectable_implementation(&impls, impl_data, attr_data);

    let mut visitor = AttributeRemovalVisitor;
    visitor.visit_item_impl_mut(&mut impls);

    Ok(quote! {
        #impls
        #expanded
    })
}

fn attribute_name(attr: &Attribute) -> Option<String> {
    attr.path().get_ident().map(|ident| ident.to_string())
}

fn has_attribute(item_fn: &ImplItemFn, name: &str) -> bool {
    item_fn
        .attrs
        .iter()
        .any(|attr| attribute_name(attr).is_some_and(|it| it == name))
}

fn parse_items(items: &[ImplItem], impl_span: Span) -> SynResult<ImplementationData> {
    let mut data = ImplementationData::default();

    for item_fn in items.iter().filter_map(filter_and_map_item_fn) {
        let signature = &item_fn.sig;
        let inject = has_attribute(item_fn, "inject");
        let constructor = has_attribute(item_fn, "constructor");

        match (signature.receiver(), inject, constructor) {
            (_, true, true) => {
                return Err(SynError::new(
                    signature.span(),
                    "`#[inject]` and `#[constructor]` can't be used together",
                ));
            }
            (None, true, false) | (None, false, true) => {
                data.constructors.push(parse_constructor(signature, inject)?);
            }
            (Some(receiver), true, false) => {
                check_mutable_receiver(receiver)?;
                data.methods.push(parse_method(signature)?);
            }
            (Some(receiver), false, true) => {
                return Err(SynError::new(
                    receiver.span(),
                    "method is not allowed to be annotated with `#[constructor]`",
                ));
            }
            _ => {}
        }

        for (name, kind) in [
            ("start", HookKind::Start),
            ("stop", HookKind::Stop),
            ("dispose", HookKind::Dispose),
        ] {
            if has_attribute(item_fn, name) {
                data.hooks.push(parse_hook(signature, kind)?);
            }
        }

        for attr in &item_fn.attrs {
            if attribute_name(attr).is_some_and(|name| name == "intercept") {
                data.interceptors
                    .push(parse_interceptor(attr, signature.ident.clone())?);
            }
        }
    }

    if data.constructors.is_empty() {
        return Err(SynError::new(
            impl_span,
            "no associated function is annotated with `#[inject]` or `#[constructor]`",
        ));
    }
    Ok(data)
}

fn filter_and_map_item_fn(item: &ImplItem) -> Option<&ImplItemFn> {
    if let ImplItem::Fn(impl_fn) = item {
        Some(impl_fn)
    } else {
        None
    }
}

fn check_mutable_receiver(receiver: &Receiver) -> SynResult<()> {
    if receiver.reference.is_some() && receiver.mutability.is_some() {
        Ok(())
    } else {
        Err(SynError::new(
            receiver.span(),
            "an injected method should take `&mut self`",
        ))
    }
}

fn parse_constructor(signature: &Signature, marked: bool) -> SynResult<FunctionData> {
    Ok(FunctionData {
        identifier: signature.ident.clone(),
        marked,
        arguments: parse_arguments(&signature.inputs)?,
        return_type: parse_constructor_return_type(&signature.output)?,
    })
}

fn parse_method(signature: &Signature) -> SynResult<FunctionData> {
    Ok(FunctionData {
        identifier: signature.ident.clone(),
        marked: true,
        arguments: parse_arguments(&signature.inputs)?,
        return_type: parse_unit_return_type(&signature.output)?,
    })
}

fn parse_hook(signature: &Signature, kind: HookKind) -> SynResult<HookData> {
    let shared_receiver = signature
        .receiver()
        .is_some_and(|receiver| receiver.reference.is_some() && receiver.mutability.is_none());
    if !shared_receiver || signature.inputs.len() != 1 {
        return Err(SynError::new(
            signature.span(),
            "a lifecycle hook should take `&self` and nothing else",
        ));
    }

    Ok(HookData {
        kind,
        identifier: signature.ident.clone(),
        return_type: parse_unit_return_type(&signature.output)?,
    })
}

fn parse_interceptor(attr: &Attribute, method: Ident) -> SynResult<InterceptorData> {
    let args = attr.parse_args_with(Punctuated::<Expr, Comma>::parse_terminated)?;
    let mut args = args.into_iter();

    let Some(Expr::Lit(ExprLit {
        lit: Lit::Str(interceptor),
        ..
    })) = args.next()
    else {
        return Err(SynError::new(
            attr.span(),
            "expects `#[intercept(\"name\")]` or `#[intercept(\"name\", order)]`",
        ));
    };
    let order = args.next().unwrap_or_else(|| syn::parse_quote!(0));
    if let Some(extra) = args.next() {
        return Err(SynError::new(
            extra.span(),
            "`#[intercept(...)]` receives at most a name and an order",
        ));
    }

    Ok(InterceptorData {
        method,
        interceptor,
        order,
    })
}

fn parse_arguments(inputs: &Punctuated<FnArg, Comma>) -> SynResult<Vec<ArgumentData>> {
    inputs
        .iter()
        .filter_map(|arg| match arg {
            FnArg::Typed(arg) => Some(arg),
            FnArg::Receiver(_) => None,
        })
        .map(|arg| {
            let name = parse_argument_name(&arg.attrs, &arg.pat)?;
            Ok(ArgumentData {
                span: arg.span(),
                name,
                kind: classify_argument(&arg.ty),
            })
        })
        .collect()
}

fn parse_argument_name(attrs: &[Attribute], pat: &Pat) -> SynResult<LitStr> {
    let mut res = None;

    for attr in attrs {
        if !attribute_name(attr).is_some_and(|name| name == "named") {
            continue;
        }
        if res.is_some() {
            return Err(SynError::new(
                attr.span(),
                "only one `#[named(...)]` is allowed",
            ));
        }
        let name = attr.parse_args::<LitStr>().map_err(|err| {
            SynError::new(err.span(), "expects `#[named(...)]` to receive a `&'static str`")
        })?;
        res = Some(name);
    }

    match (res, pat) {
        (Some(name), _) => Ok(name),
        (None, Pat::Ident(pat)) => Ok(LitStr::new(&pat.ident.to_string(), pat.ident.span())),
        (None, pat) => Err(SynError::new(
            pat.span(),
            "a destructured argument needs `#[named(...)]`",
        )),
    }
}

fn classify_argument(ty: &Type) -> ArgumentKind {
    if let Some(inner) = single_type_argument(ty, "Arc") {
        ArgumentKind::Arc(inner.clone())
    } else if let Some(inner) = single_type_argument(ty, "Option") {
        match single_type_argument(inner, "Arc") {
            Some(object) => ArgumentKind::OptionalArc(object.clone()),
            None => ArgumentKind::OptionalValue(inner.clone()),
        }
    } else {
        ArgumentKind::Value(ty.clone())
    }
}

fn single_type_argument<'a>(ty: &'a Type, wrapper: &str) -> Option<&'a Type> {
    let Type::Path(TypePath { qself: None, path }) = ty else {
        return None;
    };
    let segment = path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    if args.args.len() != 1 {
        return None;
    }
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

fn is_self_type(ty: &Type) -> bool {
    matches!(ty, Type::Path(TypePath { qself: None, path }) if path.is_ident("Self"))
}

fn is_unit_type(ty: &Type) -> bool {
    matches!(ty, Type::Tuple(tuple) if tuple.elems.is_empty())
}

/// Returns the type wrapped by `Result<T, ..>`, accepting any path ending
/// with `Result`.
fn result_ok_type(ty: &Type) -> Option<&Type> {
    let Type::Path(TypePath { qself: None, path }) = ty else {
        return None;
    };
    let segment = path.segments.last()?;
    if segment.ident != "Result" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

fn parse_constructor_return_type(output: &ReturnType) -> SynResult<ReturnTypeData> {
    let error = || {
        SynError::new(
            output.span(),
            "a constructor's return type should be `Self` or `Result<Self, E>`",
        )
    };
    let ReturnType::Type(_, return_type) = output else {
        return Err(error());
    };

    if is_self_type(return_type) {
        Ok(ReturnTypeData::Infallible)
    } else if result_ok_type(return_type).is_some_and(is_self_type) {
        Ok(ReturnTypeData::Result)
    } else {
        Err(error())
    }
}

fn parse_unit_return_type(output: &ReturnType) -> SynResult<ReturnTypeData> {
    match output {
        ReturnType::Default => Ok(ReturnTypeData::Infallible),
        ReturnType::Type(_, ty) if is_unit_type(ty) => Ok(ReturnTypeData::Infallible),
        ReturnType::Type(_, ty) if result_ok_type(ty).is_some_and(is_unit_type) => {
            Ok(ReturnTypeData::Result)
        }
        ReturnType::Type(_, ty) => Err(SynError::new(
            ty.span(),
            "the return type should be `()` or `Result<(), E>`",
        )),
    }
}

fn expand_injectable_implementation(
    impls: &ItemImpl,
    impl_data: ImplementationData,
    attr_data: AttributeData,
) -> TokenStream2 {
    let self_type = &impls.self_ty;
    let (impl_generics, _, where_clause) = impls.generics.split_for_impl();
    let type_name = type_display_name(self_type);

    let constructors = impl_data
        .constructors
        .iter()
        .map(|ctor| expand_constructor(ctor, &type_name));
    let methods = impl_data.methods.iter().map(expand_method);
    let interceptors = impl_data.interceptors.iter().map(|data| {
        let method = LitStr::new(&data.method.to_string(), data.method.span());
        let interceptor = &data.interceptor;
        let order = &data.order;
        quote! { .intercept(#method, #interceptor, #order) }
    });
    let lifecycle = attr_data.lifecycle_tokens();
    let hooks = impl_data.hooks.iter().map(expand_hook);

    quote! {
        impl #impl_generics ::ioc_kernel::planning::Injectable for #self_type #where_clause {
            fn describe() -> ::ioc_kernel::planning::TypeDescriptor {
                ::ioc_kernel::planning::TypeDescriptor::builder::<Self>()
                    #(#constructors)*
                    #(#methods)*
                    #(#interceptors)*
                    #lifecycle
                    #(#hooks)*
                    .build()
            }
        }
    }
}

fn type_display_name(self_type: &Type) -> String {
    match self_type {
        Type::Path(TypePath { path, .. }) => path
            .segments
            .last()
            .map(|segment| segment.ident.to_string())
            .unwrap_or_default(),
        ty => ty.to_token_stream().to_string(),
    }
}

fn expand_targets(arguments: &[ArgumentData]) -> TokenStream2 {
    let targets = arguments.iter().map(|arg| {
        let name = &arg.name;
        match &arg.kind {
            ArgumentKind::Arc(ty) | ArgumentKind::Value(ty) => {
                quote! { ::ioc_kernel::planning::TargetDescriptor::required::<#ty>(#name) }
            }
            ArgumentKind::OptionalArc(ty) | ArgumentKind::OptionalValue(ty) => {
                quote! { ::ioc_kernel::planning::TargetDescriptor::optional::<#ty>(#name) }
            }
        }
    });
    quote! { ::std::vec![#(#targets),*] }
}

fn expand_reads(arguments: &[ArgumentData], values: &Ident) -> (TokenStream2, Vec<Ident>) {
    let deps: Vec<_> = arguments
        .iter()
        .enumerate()
        .map(|(i, arg)| Ident::new(&format!("dep{i}"), arg.span))
        .collect();
    let reads = arguments
        .iter()
        .zip(&deps)
        .enumerate()
        .map(|(i, (arg, dep))| match &arg.kind {
            ArgumentKind::Arc(ty) => quote! { let #dep = #values.arc::<#ty>(#i)?; },
            ArgumentKind::OptionalArc(ty) => {
                quote! { let #dep = #values.optional_arc::<#ty>(#i)?; }
            }
            ArgumentKind::Value(ty) => quote! { let #dep = #values.value::<#ty>(#i)?; },
            ArgumentKind::OptionalValue(ty) => {
                quote! { let #dep = #values.optional_value::<#ty>(#i)?; }
            }
        })
        .collect();
    (reads, deps)
}

fn arguments_ident(arguments: &[ArgumentData]) -> Ident {
    if arguments.is_empty() {
        Ident::new("_arguments", Span::call_site())
    } else {
        Ident::new("arguments", Span::call_site())
    }
}

fn wrap_call(call: TokenStream2, return_type: &ReturnTypeData) -> TokenStream2 {
    match return_type {
        ReturnTypeData::Infallible => quote! { ::std::result::Result::Ok(#call) },
        ReturnTypeData::Result => quote! { #call.map_err(::std::convert::Into::into) },
    }
}

fn expand_constructor(ctor: &FunctionData, type_name: &str) -> TokenStream2 {
    let identifier = &ctor.identifier;
    let name = LitStr::new(&format!("{type_name}::{identifier}"), identifier.span());
    let targets = expand_targets(&ctor.arguments);
    let marked = ctor.marked;
    let values = arguments_ident(&ctor.arguments);
    let (reads, deps) = expand_reads(&ctor.arguments, &values);
    let call = wrap_call(quote! { Self::#identifier(#(#deps),*) }, &ctor.return_type);

    quote! {
        .constructor(
            #name,
            #targets,
            #marked,
            |#values: ::ioc_kernel::planning::ArgumentValues|
                -> ::std::result::Result<Self, ::ioc_kernel::planning::BoxError> {
                #reads
                #call
            },
        )
    }
}

fn expand_method(method: &FunctionData) -> TokenStream2 {
    let identifier = &method.identifier;
    let name = LitStr::new(&identifier.to_string(), identifier.span());
    let targets = expand_targets(&method.arguments);
    let values = arguments_ident(&method.arguments);
    let (reads, deps) = expand_reads(&method.arguments, &values);
    let call = wrap_call(quote! { object.#identifier(#(#deps),*) }, &method.return_type);

    quote! {
        .method(
            #name,
            #targets,
            |object: &mut Self, #values: ::ioc_kernel::planning::ArgumentValues|
                -> ::std::result::Result<(), ::ioc_kernel::planning::BoxError> {
                #reads
                #call
            },
        )
    }
}

fn expand_hook(hook: &HookData) -> TokenStream2 {
    let identifier = &hook.identifier;
    let register = match hook.kind {
        HookKind::Start => quote! { on_start },
        HookKind::Stop => quote! { on_stop },
        HookKind::Dispose => quote! { on_dispose },
    };
    let call = wrap_call(quote! { object.#identifier() }, &hook.return_type);

    quote! {
        .#register(
            |object: &Self| -> ::std::result::Result<(), ::ioc_kernel::planning::BoxError> {
                #call
            },
        )
    }
}
