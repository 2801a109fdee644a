//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0
use std::fs::File;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

/// Numbers gathered over one PSI run on one party
///
/// Counts are local to the party, they are logged and optionally saved
/// but never sent to the other parties.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    protocol_name: String,
    rank: usize,
    original_count: Option<usize>,
    intersection_count: Option<usize>,
    bucket_count: Option<usize>,
    bytes_sent: Option<u64>,
    bytes_received: Option<u64>,
}

impl Metrics {
    pub fn new(protocol_name: &str, rank: usize) -> Metrics {
        Metrics {
            protocol_name: String::from(protocol_name),
            rank,
            ..Default::default()
        }
    }

    pub fn set_original_count(&mut self, n: usize) {
        self.original_count = Some(n);
    }

    pub fn set_intersection_count(&mut self, n: usize) {
        self.intersection_count = Some(n);
    }

    pub fn set_bucket_count(&mut self, n: usize) {
        self.bucket_count = Some(n);
    }

    pub fn set_traffic(&mut self, bytes_sent: u64, bytes_received: u64) {
        self.bytes_sent = Some(bytes_sent);
        self.bytes_received = Some(bytes_received);
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn save_metrics<T: AsRef<Path>>(&self, path: T) -> Result<(), std::io::Error> {
        let f = File::create(path)?;
        serde_json::to_writer(f, self).map_err(std::io::Error::from)
    }

    pub fn log_metrics(&self) {
        match self.to_json() {
            Ok(s) => info!("metrics: {}", s),
            Err(e) => warn!("unable to serialize metrics: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_json() {
        let mut m = Metrics::new("ecdh-2pc", 1);
        m.set_original_count(4);
        m.set_intersection_count(2);
        assert_eq!(
            m.to_json().unwrap(),
            "{\"protocol_name\":\"ecdh-2pc\",\"rank\":1,\"original_count\":4,\
             \"intersection_count\":2,\"bucket_count\":null,\"bytes_sent\":null,\
             \"bytes_received\":null}"
        );
    }

    #[test]
    fn test_metrics_save() {
        use std::io::Read;

        use tempfile::NamedTempFile;

        let mut m = Metrics::new("kkrt-2pc", 0);
        m.set_bucket_count(3);
        m.set_traffic(100, 200);

        let mut file = NamedTempFile::new().unwrap();
        m.save_metrics(file.path()).unwrap();
        m.log_metrics();
        let mut buf = String::new();
        file.read_to_string(&mut buf).unwrap();
        let back: Metrics = serde_json::from_str(&buf).unwrap();
        assert_eq!(back, m);
    }
}
