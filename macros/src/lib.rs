extern crate proc_macro;

macro_rules! bail {
    ($item:expr, $fmt:literal $($tts:tt)*) => {
        return Err(Error::new_spanned(
            &$item,
            format!(concat!("jam: ", $fmt) $($tts)*)
        ))
    }
}

mod target;

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_quote, Error, Result};

/// Turn a function into a memoized target.
///
/// ```ignore
/// #[target]
/// fn classes(memo: &Memo, dir: String) -> Result<FileSet> {
///     let sources = sources(memo)?;
///     compile(&dir, &sources)
/// }
/// ```
///
/// The first parameter is the memo the target runs in, the remaining ones are
/// the arguments that identify the call. With `#[target(variadic)]`, the
/// elements of the last parameter are flattened into the argument list.
#[proc_macro_attribute]
pub fn target(args: TokenStream, stream: TokenStream) -> TokenStream {
    let meta = syn::parse_macro_input!(args as target::Meta);
    let func = syn::parse_macro_input!(stream as syn::ItemFn);
    target::expand(&meta, func)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
