use proc_macro::TokenStream;
use quote::ToTokens;
use syn::parse::{Parse, ParseStream};
use syn::visit_mut::{self, VisitMut};
use syn::{parse_macro_input, parse_quote, Attribute, Block, Expr, ImplItemFn, ItemFn, ItemMod};

/// The size hint passed to the attribute.
struct HintExpr {
    hint: Expr,
}

impl Parse for HintExpr {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        Ok(HintExpr {
            hint: input.parse()?,
        })
    }
}

fn guarded_body(hint: &Expr, body: &Block) -> Block {
    parse_quote!({
        let _lifetime_guard = ::lifetime_memory::LifetimeGuard::new(#hint);
        #body
    })
}

/// Wraps every function and method body it reaches in a lifetime guard.
struct ScopeVisitor {
    hint: Expr,
}

impl VisitMut for ScopeVisitor {
    fn visit_item_fn_mut(&mut self, func: &mut ItemFn) {
        // Functions with their own attribute get their own hint.
        if !has_scoped_lifetime_attr(&func.attrs) {
            func.block = Box::new(guarded_body(&self.hint, &func.block));
        }

        visit_mut::visit_item_fn_mut(self, func);
    }

    fn visit_impl_item_fn_mut(&mut self, method: &mut ImplItemFn) {
        if !has_scoped_lifetime_attr(&method.attrs) {
            method.block = guarded_body(&self.hint, &method.block);
        }

        visit_mut::visit_impl_item_fn_mut(self, method);
    }
}

fn has_scoped_lifetime_attr(attrs: &[Attribute]) -> bool {
    attrs
        .iter()
        .any(|attr| attr.path().is_ident("scoped_lifetime"))
}

/// Runs a function body inside a lifetime scope.
///
/// `#[scoped_lifetime(hint)]` on a function opens a scope with `hint` before
/// the body runs and closes it however the body exits. On an inline module it
/// does the same for every function and `impl` method inside, nested modules
/// included.
#[proc_macro_attribute]
pub fn scoped_lifetime(attr: TokenStream, item: TokenStream) -> TokenStream {
    let hint = parse_macro_input!(attr as HintExpr).hint;

    if let Ok(mut module) = syn::parse::<ItemMod>(item.clone()) {
        let mut visitor = ScopeVisitor { hint };
        visitor.visit_item_mod_mut(&mut module);

        module.to_token_stream().into()
    } else if let Ok(mut function) = syn::parse::<ItemFn>(item.clone()) {
        function.block = Box::new(guarded_body(&hint, &function.block));
        function.to_token_stream().into()
    } else {
        syn::Error::new_spanned(
            proc_macro2::TokenStream::from(item),
            "scoped_lifetime attribute can only be applied to modules or functions",
        )
        .to_compile_error()
        .into()
    }
}
