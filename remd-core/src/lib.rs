#![doc = "remd-core: convert a remote GitHub or Azure DevOps repository into one Markdown document."]

//! This crate contains the whole conversion pipeline; the `remd` crate is only
//! a command-line front end over [`convert::convert`].
//!
//! # Pipeline
//! URL ([`url_parser`]) → provider ([`provider`]) → tree listing → path filter
//! ([`filter`]) → concurrent content fetch → ordered tree ([`tree`]) →
//! Markdown ([`render`]).
//!
//! # Usage
//! Build a [`convert::ConvertRequest`], pass a progress callback and a
//! [`cancel::CancellationToken`], and read the document off the returned
//! [`contract::ConversionReport`].

pub mod cancel;
pub mod config;
pub mod contract;
pub mod convert;
pub mod error;
pub mod filter;
pub mod http;
pub mod language;
pub mod provider;
pub mod render;
pub mod tree;
pub mod url_parser;
