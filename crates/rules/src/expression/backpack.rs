//! Read-only view over aligned series for one evaluation step.

use std::collections::HashMap;

use vigil_core::Series;

use crate::error::ExpressionError;

use super::ast::DEFAULT_TARGET;
use super::value::Value;

/// Named series addressed by macro (`$0`, `$1`, ...) plus the current index.
///
/// `target_data_name` is the primary series; calls without an explicit
/// target resolve to it.
#[derive(Debug, Clone, Copy)]
pub struct DataBackpack<'a> {
    pub target_data_name: &'a str,
    pub target_index: usize,
    pub data_vector: &'a HashMap<String, Series>,
}

impl<'a> DataBackpack<'a> {
    pub fn new(
        target_data_name: &'a str,
        target_index: usize,
        data_vector: &'a HashMap<String, Series>,
    ) -> Self {
        Self {
            target_data_name,
            target_index,
            data_vector,
        }
    }

    /// Resolve a call target to a data name, mapping `default` to the primary series.
    pub fn get_key_data_name<'t>(&self, target: &'t str) -> Result<&'t str, ExpressionError>
    where
        'a: 't,
    {
        let name = if target == DEFAULT_TARGET {
            self.target_data_name
        } else {
            target
        };
        if !self.data_vector.contains_key(name) {
            return Err(ExpressionError::UnknownName(name.to_string()));
        }
        Ok(name)
    }

    pub fn series(&self, data_name: &str) -> Result<&'a Series, ExpressionError> {
        self.data_vector
            .get(data_name)
            .ok_or_else(|| ExpressionError::UnknownName(data_name.to_string()))
    }

    pub fn get_time_stamp(&self, index: usize, data_name: &str) -> Result<i64, ExpressionError> {
        self.series(data_name)?
            .get(index)
            .map(|s| s.ts())
            .ok_or_else(|| ExpressionError::InvalidIndex {
                name: data_name.to_string(),
                index,
            })
    }

    /// Value at `index`; numeric strings come back as numbers.
    pub fn get_data_value(&self, index: usize, data_name: &str) -> Result<Value, ExpressionError> {
        self.series(data_name)?
            .get(index)
            .map(|s| Value::from_sample(s.value()))
            .ok_or_else(|| ExpressionError::InvalidIndex {
                name: data_name.to_string(),
                index,
            })
    }
}
