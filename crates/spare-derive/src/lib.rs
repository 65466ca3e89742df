use proc_macro::TokenStream;

mod impl_streamable;

use impl_streamable::impl_streamable;

#[proc_macro_derive(Streamable)]
pub fn streamable(input: TokenStream) -> TokenStream {
    impl_streamable(input)
}
