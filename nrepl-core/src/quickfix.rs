//! Error reports shaped for an editor's quickfix list.
//!
//! Hosts read the fields positionally, so the layout of [`Report`] and [`Item`]
//! is part of the tunnel's output contract.
use std::{fs, panic::Location};

use serde_derive::Serialize;

use crate::error::Error;

/// Placeholder module for frames that have no source location.
pub const CAUSE_MODULE: &str = "<cause>";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub title: String,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub filename: String,
    pub lnum: u32,
    pub module: String,
    pub text: String,
}

impl Report {
    /// Builds a report for `error`, outermost frame first: the place the error
    /// was caught (the caller of `capture`), the place it was raised, then one
    /// frame per underlying cause.
    #[track_caller]
    pub fn capture(error: &Error) -> Self {
        let mut items = vec![Item::at(Location::caller()), Item::at(error.location())];

        let mut cause = std::error::Error::source(error);
        while let Some(inner) = cause {
            items.push(Item::placeholder(CAUSE_MODULE, inner.to_string()));
            cause = inner.source();
        }

        Self {
            title: error.to_string(),
            items,
        }
    }
}

impl Item {
    pub fn at(location: &Location<'_>) -> Self {
        let file = location.file();

        Self {
            filename: file.to_owned(),
            lnum: location.line(),
            module: String::new(),
            text: source_line(file, location.line()).unwrap_or_default(),
        }
    }

    pub fn placeholder(module: &str, text: String) -> Self {
        Self {
            filename: String::new(),
            lnum: 0,
            module: module.to_owned(),
            text,
        }
    }
}

/// Line `lnum` (1-based) of `path`, trimmed, if the source is readable from here.
fn source_line(path: &str, lnum: u32) -> Option<String> {
    let index = usize::try_from(lnum).ok()?.checked_sub(1)?;

    fs::read_to_string(path)
        .ok()?
        .lines()
        .nth(index)
        .map(|line| line.trim().to_owned())
}
