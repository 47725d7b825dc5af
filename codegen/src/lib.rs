use proc_macro::TokenStream;

mod component;
mod util;

/// Derives `tessera::Component`.
///
/// Options are passed through `#[tessera(...)]`:
/// - `unique`: store one value per chunk instead of one per entity.
/// - `soa`: store each field in its own array. The type must be `Copy`.
/// - `name = "..."`: override the registered name, which defaults to the type name.
/// - `tessera_as(path)`: the path of the tessera crate, `::tessera` by default.
#[proc_macro_derive(Component, attributes(tessera))]
pub fn component(input: TokenStream) -> TokenStream {
    component::imp(input.into()).unwrap_or_else(|err| err.to_compile_error()).into()
}
