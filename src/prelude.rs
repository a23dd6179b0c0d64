//! Crate-internal prelude, imported by (almost) every module.

pub(crate) use std::collections::{BTreeMap, HashMap};
pub(crate) use std::sync::Arc;
pub(crate) use std::vec::Vec;

pub(crate) use crate::error::{Errno, Error, Result};
pub(crate) use crate::{return_errno, return_errno_with_msg};
