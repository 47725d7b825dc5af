use matches2::option_match;
use proc_macro2::{Span, TokenStream};
use quote::{quote, ToTokens};
use syn::parse::{Parse, ParseStream};
use syn::punctuated::Punctuated;
use syn::{Error, Result};

use crate::util;

pub(crate) fn imp(input: TokenStream) -> Result<TokenStream> {
    let input: syn::DeriveInput = syn::parse2(input)?;
    let generics = util::parse_generics(&input);

    let mut options = Vec::new();
    for attr in &input.attrs {
        if attr.path().is_ident("tessera") {
            let attr: Attr = attr.parse_args()?;
            options.extend(attr.options);
        }
    }

    let crate_name = find_one(&options, |opt| option_match!(opt, Opt::TesseraAs(_, path) => path))?
        .map_or_else(|| quote!(::tessera), |path| path.clone());
    let unique = find_one(&options, |opt| option_match!(opt, Opt::Unique(name) => name))?;
    let soa = find_one(&options, |opt| option_match!(opt, Opt::Soa(name) => name))?;
    let name = find_one(&options, |opt| option_match!(opt, Opt::Name(_, _, name) => name))?;

    if let (Some(_), Some(soa)) = (unique, soa) {
        return Err(Error::new_spanned(soa, "unique components cannot use the SoA layout"));
    }

    let kind = unique.map(|_| {
        quote! {
            const KIND: #crate_name::entity::Kind = #crate_name::entity::Kind::Unique;
        }
    });

    let name = name.map(|name| {
        quote! {
            fn name() -> &'static str { #name }
        }
    });

    let soa = match soa {
        Some(soa) => Some(soa_items(&input, soa, &crate_name)?),
        None => None,
    };

    let impl_comp = generics.impl_trait(
        quote!(#crate_name::comp::Component),
        quote! {
            #kind
            #name
            #soa
        },
    );

    Ok(quote! {
        #[automatically_derived]
        #impl_comp
    })
}

fn soa_items(input: &syn::DeriveInput, soa: &syn::Ident, crate_name: &TokenStream) -> Result<TokenStream> {
    let fields = match &input.data {
        syn::Data::Struct(data) => &data.fields,
        _ => return Err(Error::new_spanned(soa, "only structs can use the SoA layout")),
    };
    if fields.is_empty() {
        return Err(Error::new_spanned(soa, "SoA components must have at least one field"));
    }

    let fields = fields.iter().enumerate().map(|(index, field)| {
        let ty = &field.ty;
        let member = match &field.ident {
            Some(ident) => ident.to_token_stream(),
            None => syn::Index::from(index).to_token_stream(),
        };
        quote! {
            #crate_name::comp::SoaField::of::<#ty>(::core::mem::offset_of!(Self, #member))
        }
    });

    Ok(quote! {
        const LAYOUT: #crate_name::comp::LayoutTag = #crate_name::comp::LayoutTag::Soa;

        fn soa_fields() -> ::std::vec::Vec<#crate_name::comp::SoaField> {
            fn assert_copy<T: Copy>() {}
            assert_copy::<Self>();

            ::std::vec![#(#fields),*]
        }
    })
}

fn find_one<'t, T: ?Sized>(options: &'t [Opt], matcher: impl Fn(&'t Opt) -> Option<&'t T>) -> Result<Option<&'t T>> {
    let mut found = None;
    for opt in options {
        if let Some(value) = matcher(opt) {
            if found.is_some() {
                return Err(Error::new(opt.span(), "option is specified more than once"));
            }
            found = Some(value);
        }
    }
    Ok(found)
}

struct Attr {
    options: Punctuated<Opt, syn::Token![,]>,
}

impl Parse for Attr {
    fn parse(input: ParseStream) -> Result<Self> {
        Ok(Attr { options: Punctuated::parse_terminated(input)? })
    }
}

enum Opt {
    TesseraAs(syn::Ident, TokenStream),
    Unique(syn::Ident),
    Soa(syn::Ident),
    Name(syn::Ident, syn::Token![=], syn::LitStr),
}

impl Opt {
    fn span(&self) -> Span {
        match self {
            Opt::TesseraAs(name, _) | Opt::Unique(name) | Opt::Soa(name) | Opt::Name(name, ..) => name.span(),
        }
    }
}

impl Parse for Opt {
    fn parse(input: ParseStream) -> Result<Self> {
        let name = input.parse::<syn::Ident>()?;

        let opt = match name.to_string().as_str() {
            "tessera_as" => {
                let inner;
                syn::parenthesized!(inner in input);
                Opt::TesseraAs(name, inner.parse()?)
            }
            "unique" => Opt::Unique(name),
            "soa" => Opt::Soa(name),
            "name" => Opt::Name(name, input.parse()?, input.parse()?),
            _ => return Err(Error::new_spanned(&name, "Unknown attribute")),
        };

        Ok(opt)
    }
}
