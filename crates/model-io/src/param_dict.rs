// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Typed parameter lookup for layers.
//!
//! Parameters arrive as `id=value` tokens:
//!
//! ```text
//! 0=16            integer
//! 1=0.001         float (contains '.', 'e' or 'E')
//! -23302=3,1,2,3  array for id 2 (array ids are encoded as -23300 - id)
//! ```
//!
//! Layers read them back through [`ParamDict`] with defaults for optional
//! ids and `require_*` for mandatory ones.

use crate::{DataReader, ModelError};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Highest parameter id (exclusive) a layer may use.
pub const MAX_PARAM_COUNT: i32 = 32;

/// Array parameters are written with id `ARRAY_ID_BASE - id`.
pub const ARRAY_ID_BASE: i32 = -23300;

/// A single parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i32),
    Float(f32),
    IntArray(Vec<i32>),
    FloatArray(Vec<f32>),
}

/// The parameters of one layer, keyed by numeric id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamDict {
    values: BTreeMap<i32, ParamValue>,
}

impl ParamDict {
    /// Creates an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value, replacing any previous one. Returns `self` for chaining.
    pub fn set(&mut self, id: i32, value: ParamValue) -> &mut Self {
        self.values.insert(id, value);
        self
    }

    /// Builder-style variant of [`set`](Self::set).
    pub fn with(mut self, id: i32, value: ParamValue) -> Self {
        self.values.insert(id, value);
        self
    }

    /// Returns the raw value for `id`, if present.
    pub fn get(&self, id: i32) -> Option<&ParamValue> {
        self.values.get(&id)
    }

    /// Returns the integer at `id`, or `default` if absent.
    ///
    /// Floats are truncated toward zero.
    pub fn get_int(&self, id: i32, default: i32) -> i32 {
        match self.values.get(&id) {
            Some(ParamValue::Int(v)) => *v,
            Some(ParamValue::Float(v)) => *v as i32,
            _ => default,
        }
    }

    /// Returns the float at `id`, or `default` if absent.
    pub fn get_float(&self, id: i32, default: f32) -> f32 {
        match self.values.get(&id) {
            Some(ParamValue::Float(v)) => *v,
            Some(ParamValue::Int(v)) => *v as f32,
            _ => default,
        }
    }

    /// Returns the array at `id` as floats, if present.
    pub fn get_array(&self, id: i32) -> Option<Vec<f32>> {
        match self.values.get(&id) {
            Some(ParamValue::FloatArray(v)) => Some(v.clone()),
            Some(ParamValue::IntArray(v)) => Some(v.iter().map(|&x| x as f32).collect()),
            _ => None,
        }
    }

    /// Returns the integer at `id`, failing if it is absent or not an integer.
    pub fn require_int(&self, id: i32) -> Result<i32, ModelError> {
        match self.values.get(&id) {
            Some(ParamValue::Int(v)) => Ok(*v),
            Some(other) => Err(ModelError::ParamError {
                id,
                detail: format!("expected an integer, got {other:?}"),
            }),
            None => Err(ModelError::ParamError {
                id,
                detail: "required parameter is missing".into(),
            }),
        }
    }

    /// Returns the non-negative integer at `id` as a count or size.
    pub fn require_count(&self, id: i32) -> Result<usize, ModelError> {
        let value = self.require_int(id)?;
        usize::try_from(value).map_err(|_| ModelError::ParamError {
            id,
            detail: format!("expected a non-negative count, got {value}"),
        })
    }

    /// Returns the float at `id`, failing if it is absent or an array.
    pub fn require_float(&self, id: i32) -> Result<f32, ModelError> {
        match self.values.get(&id) {
            Some(ParamValue::Float(v)) => Ok(*v),
            Some(ParamValue::Int(v)) => Ok(*v as f32),
            Some(other) => Err(ModelError::ParamError {
                id,
                detail: format!("expected a number, got {other:?}"),
            }),
            None => Err(ModelError::ParamError {
                id,
                detail: "required parameter is missing".into(),
            }),
        }
    }

    /// Number of parameters set.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if no parameters are set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterates parameters in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &ParamValue)> {
        self.values.iter().map(|(&id, v)| (id, v))
    }

    /// Consumes consecutive `id=value` tokens from `tokens`.
    ///
    /// Stops at the first token without `=` (left in place for the caller)
    /// or at end of data.
    pub fn load<R: DataReader + ?Sized>(tokens: &mut ParamTokens<'_, R>) -> Result<Self, ModelError> {
        let mut pd = Self::new();
        while let Some(token) = tokens.next_if(|t| t.contains('=')) {
            let (id, value) = parse_entry(&token)?;
            pd.values.insert(id, value);
        }
        Ok(pd)
    }
}

/// Parses one `id=value` token.
pub(crate) fn parse_entry(token: &str) -> Result<(i32, ParamValue), ModelError> {
    let (id_str, value_str) = token.split_once('=').ok_or_else(|| ModelError::ParamError {
        id: -1,
        detail: format!("expected 'id=value', got '{token}'"),
    })?;
    let raw_id: i32 = id_str.parse().map_err(|_| ModelError::ParamError {
        id: -1,
        detail: format!("invalid parameter id '{id_str}'"),
    })?;

    let (id, value) = if raw_id <= ARRAY_ID_BASE {
        let id = ARRAY_ID_BASE - raw_id;
        (id, parse_array(id, value_str)?)
    } else {
        (raw_id, parse_scalar(raw_id, value_str)?)
    };

    if !(0..MAX_PARAM_COUNT).contains(&id) {
        return Err(ModelError::ParamError {
            id,
            detail: format!("id out of range 0..{MAX_PARAM_COUNT}"),
        });
    }
    Ok((id, value))
}

fn is_float_literal(s: &str) -> bool {
    s.chars().any(|c| c == '.' || c == 'e' || c == 'E')
}

fn parse_number<T: FromStr>(id: i32, s: &str) -> Result<T, ModelError> {
    s.parse().map_err(|_| ModelError::ParamError {
        id,
        detail: format!("malformed value '{s}'"),
    })
}

fn parse_scalar(id: i32, s: &str) -> Result<ParamValue, ModelError> {
    if is_float_literal(s) {
        Ok(ParamValue::Float(parse_number(id, s)?))
    } else {
        Ok(ParamValue::Int(parse_number(id, s)?))
    }
}

fn parse_array(id: i32, s: &str) -> Result<ParamValue, ModelError> {
    let mut parts = s.split(',');
    let count: usize = parse_number(id, parts.next().unwrap_or_default())?;
    let items: Vec<&str> = parts.collect();
    if items.len() != count {
        return Err(ModelError::ParamError {
            id,
            detail: format!("array declares {count} items, found {}", items.len()),
        });
    }

    if items.iter().any(|item| is_float_literal(item)) {
        let values = items
            .iter()
            .map(|item| parse_number::<f32>(id, item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ParamValue::FloatArray(values))
    } else {
        let values = items
            .iter()
            .map(|item| parse_number::<i32>(id, item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ParamValue::IntArray(values))
    }
}

// ── Token stream ───────────────────────────────────────────────

/// A token stream over a [`DataReader`] with one token of lookahead.
pub struct ParamTokens<'a, R: DataReader + ?Sized> {
    reader: &'a mut R,
    peeked: Option<String>,
}

impl<'a, R: DataReader + ?Sized> ParamTokens<'a, R> {
    /// Wraps a reader.
    pub fn new(reader: &'a mut R) -> Self {
        Self {
            reader,
            peeked: None,
        }
    }

    /// Returns the next token without consuming it.
    pub fn peek(&mut self) -> Option<&str> {
        if self.peeked.is_none() {
            let mut word = String::new();
            if self.reader.scan(&mut word) {
                self.peeked = Some(word);
            }
        }
        self.peeked.as_deref()
    }

    /// Consumes and returns the next token.
    pub fn next_token(&mut self) -> Option<String> {
        self.peek();
        self.peeked.take()
    }

    /// Consumes the next token only if `pred` accepts it.
    pub fn next_if(&mut self, pred: impl FnOnce(&str) -> bool) -> Option<String> {
        match self.peek() {
            Some(token) if pred(token) => self.peeked.take(),
            _ => None,
        }
    }

    /// Consumes the next token and parses it, naming `what` in the error.
    pub fn expect<T: FromStr>(&mut self, what: &str) -> Result<T, ModelError> {
        let token = self
            .next_token()
            .ok_or_else(|| ModelError::MalformedStream(format!("unexpected end of data, expected {what}")))?;
        token
            .parse()
            .map_err(|_| ModelError::MalformedStream(format!("expected {what}, got '{token}'")))
    }
}
