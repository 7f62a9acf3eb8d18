use syn::parse::{Parse, ParseStream};

use super::*;

/// Options of the `#[target]` attribute.
pub struct Meta {
    pub variadic: bool,
}

impl Parse for Meta {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut variadic = false;
        while !input.is_empty() {
            let option: syn::Ident = input.parse()?;
            if option == "variadic" {
                variadic = true;
            } else {
                bail!(option, "unknown option `{}`", option);
            }
            if !input.is_empty() {
                let _: syn::Token![,] = input.parse()?;
            }
        }
        Ok(Self { variadic })
    }
}

/// Route a function's calls through the memo.
pub fn expand(meta: &Meta, mut func: syn::ItemFn) -> Result<proc_macro2::TokenStream> {
    if let Some(token) = &func.sig.asyncness {
        bail!(token, "async targets are not supported");
    }

    let mut inputs = func.sig.inputs.iter();
    let memo = match inputs.next() {
        Some(syn::FnArg::Typed(typed)) => ident(typed)?.clone(),
        Some(input) => bail!(input, "methods are not supported"),
        None => bail!(func.sig, "the first parameter must be the `&Memo` the target runs in"),
    };

    let mut args = vec![];
    for input in inputs {
        match input {
            syn::FnArg::Typed(typed) => args.push(ident(typed)?.clone()),
            syn::FnArg::Receiver(_) => bail!(input, "methods are not supported"),
        }
    }

    if meta.variadic && args.is_empty() {
        bail!(func.sig, "a variadic target needs at least one argument");
    }

    let output = match &func.sig.output {
        syn::ReturnType::Type(_, ty) => ty.as_ref().clone(),
        syn::ReturnType::Default => bail!(func.sig, "targets must return a `Result`"),
    };

    // The signature of the target.
    let name = func.sig.ident.to_string();
    let params = args.len();
    let target = if meta.variadic {
        quote! { ::jam::Target::new(#name, #params).variadic() }
    } else {
        quote! { ::jam::Target::new(#name, #params) }
    };

    // Move the original body into a closure that the memo may or may not
    // execute.
    let body = &func.block;
    func.block = parse_quote! { {
        static __JAM_TARGET: ::jam::Target = #target;
        let __jam_args = ::std::vec![#(::jam::internal::to_value(&#args)),*];
        #memo.call(&__JAM_TARGET, __jam_args, move |#memo: &::jam::Memo| -> #output #body)
    } };

    Ok(quote! { #func })
}

/// The name of a simple parameter.
fn ident(typed: &syn::PatType) -> Result<&syn::Ident> {
    match typed.pat.as_ref() {
        syn::Pat::Ident(syn::PatIdent {
            by_ref: None,
            mutability: None,
            ident,
            subpat: None,
            ..
        }) => Ok(ident),
        pat => bail!(pat, "only simple identifiers are supported"),
    }
}
