//! Procedural macros shared across the `rok4_*` crates.
//!
//! The only macro exported today is [`context`], which wraps a fallible
//! function body so that any `Err` is annotated with an interpolated,
//! human-readable message via [`anyhow::Context`]. This is the crate's
//! substitute for hand-written `.with_context(|| format!(...))` call sites
//! and for bespoke error enum types: every fallible function in this
//! workspace returns `anyhow::Result<T>`, and `#[context]` is how call
//! sites attach diagnostics without repeating themselves.

mod args;

use crate::args::Args;
use proc_macro::TokenStream;
use proc_macro2::{Ident, Span};
use quote::ToTokens;
use quote::quote;
use syn::parse_macro_input;

/// Wraps a function body so that any `Err` returned is mapped through
/// `anyhow::Context::context`, using the given format string.
///
/// ```ignore
/// #[context("failed to read tile {x},{y} from slab {slab}")]
/// fn read_tile(x: u32, y: u32, slab: &str) -> anyhow::Result<Vec<u8>> {
///     ...
/// }
/// ```
///
/// The format string is evaluated lazily, only when the wrapped body
/// returns an `Err`, and has access to the function's parameters by name
/// (they must implement `Display`, as with any `format!` argument).
/// Prefix the arguments with `move,` to force the inner closure to take
/// ownership of captured values.
#[proc_macro_attribute]
pub fn context(args: TokenStream, input: TokenStream) -> TokenStream {
	let Args(move_token, format_args) = parse_macro_input!(args);
	let mut input = parse_macro_input!(input as syn::ItemFn);

	let body = &input.block;
	let return_type = &input.sig.output;
	let err = Ident::new("err", Span::mixed_site());

	let new_body = if input.sig.asyncness.is_some() {
		let return_type = match return_type {
			syn::ReturnType::Default => {
				return syn::Error::new_spanned(input, "function should return Result")
					.to_compile_error()
					.into();
			}
			syn::ReturnType::Type(_, return_type) => return_type,
		};
		let result = Ident::new("result", Span::mixed_site());
		quote! {
			let #result: #return_type = async #move_token { #body }.await;
			#result.map_err(|#err| #err.context(format!(#format_args)).into())
		}
	} else {
		let force_fn_once = Ident::new("force_fn_once", Span::mixed_site());
		quote! {
			// Moving a non-`Copy` value into the closure tells borrowck to always treat the closure
			// as a `FnOnce`, preventing some borrowing errors.
			let #force_fn_once = ::core::iter::empty::<()>();
			(#move_token || #return_type {
				::core::mem::drop(#force_fn_once);
				#body
			})().map_err(|#err| #err.context(format!(#format_args)).into())
		}
	};
	input.block.stmts = vec![syn::Stmt::Expr(syn::Expr::Verbatim(new_body), None)];

	input.into_token_stream().into()
}
