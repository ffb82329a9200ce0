//! Dot-delimited watch paths such as `"user.address.city"`.

use std::sync::Arc;

use crate::instance::Instance;
use crate::observer::Value;

use super::Getter;

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '$'
}

/// Compile a path into a getter that walks it from the instance object.
///
/// Returns `None` for anything other than a plain property chain. The
/// getter yields `Undefined` as soon as an intermediate value is falsy.
pub fn parse_path(path: &str) -> Option<Getter> {
    if !path.chars().all(is_path_char) {
        return None;
    }
    let segments: Vec<String> = path.split('.').map(str::to_string).collect();
    Some(Arc::new(move |vm: &Instance| {
        let mut current = Value::Object(vm.object().clone());
        for segment in &segments {
            if !current.is_truthy() {
                return Value::Undefined;
            }
            current = current.property(segment);
        }
        current
    }))
}
