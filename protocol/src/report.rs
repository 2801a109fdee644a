//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;
use serde::Serialize;

/// Outcome of a file-backed run, local to the party
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Data rows read from the input
    pub original_count: usize,
    /// Data rows written to the output
    pub intersection_count: usize,
}

impl Report {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_field_names() {
        let r = Report {
            original_count: 10,
            intersection_count: 3,
        };
        assert_eq!(
            r.to_json().unwrap(),
            r#"{"original_count":10,"intersection_count":3}"#
        );
    }
}
