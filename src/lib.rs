//! # Dexview
//!
//! A library for decoding Android DEX files into a queryable class model.
//!
//! Only the header is parsed when a file is loaded; strings, types,
//! prototypes, field and method references and class definitions are
//! resolved on demand straight from the buffer.
//!
//! ```no_run
//!  use dexview::dex::DexFile;
//!  use std::path::Path;
//!
//!  let dex = DexFile::from_file(Path::new("classes.dex")).unwrap();
//!  println!("{}", dex);
//!  for class in dex.find_class("MainActivity") {
//!      println!("{}", class.unwrap());
//!  }
//! ```
//!
pub mod dex;
pub mod types;

pub use crate::dex::error::{DexError, DexErrorKind};
