//! Read group discovery, from both the header and individual records.

use std::collections::HashMap;

use noodles::sam::alignment::Record;
use noodles::sam::record::data::field::Tag;

/// The `RG` auxiliary tag of a record, when present.
pub fn record_read_group(record: &Record) -> Option<String> {
    record
        .data()
        .get(Tag::ReadGroup)
        .map(|value| value.to_string())
}

/// Parses the `@RG` lines out of raw header text.
///
/// Each returned map holds the tab-separated `KEY:VALUE` fields of one line
/// (`ID`, `LB`, `SM`, …), in header order. Lines without an `ID` field are
/// skipped: the specification requires one, and there is nothing to key a
/// metrics bucket on without it.
pub fn header_read_groups(raw_header: &str) -> Vec<HashMap<String, String>> {
    let mut read_groups = Vec::new();

    for line in raw_header.lines() {
        if !line.starts_with("@RG") {
            continue;
        }

        let mut fields = HashMap::new();
        for field in line.split('\t').skip(1) {
            if let Some((key, value)) = field.split_once(':') {
                fields.insert(key.to_string(), value.to_string());
            }
        }

        if fields.contains_key("ID") {
            read_groups.push(fields);
        }
    }

    read_groups
}

#[cfg(test)]
mod tests {
    use noodles::sam::record::data::field::Value;

    use super::*;

    #[test]
    fn test_header_read_groups() {
        let header = "@HD\tVN:1.6\tSO:coordinate\n\
                      @SQ\tSN:chr1\tLN:248956422\n\
                      @RG\tID:rg1\tLB:lib1\tSM:sample1\tPL:ILLUMINA\n\
                      @RG\tID:rg2\tSM:sample2\n\
                      @RG\tLB:orphan\n\
                      @PG\tID:bwa\n";

        let read_groups = header_read_groups(header);
        assert_eq!(read_groups.len(), 2);
        assert_eq!(read_groups[0].get("ID").unwrap(), "rg1");
        assert_eq!(read_groups[0].get("LB").unwrap(), "lib1");
        assert_eq!(read_groups[1].get("ID").unwrap(), "rg2");
        assert!(read_groups[1].get("LB").is_none());
    }

    #[test]
    fn test_record_read_group() {
        let mut record = Record::default();
        assert!(record_read_group(&record).is_none());

        record
            .data_mut()
            .insert(Tag::ReadGroup, Value::String(String::from("rg1")));
        assert_eq!(record_read_group(&record).unwrap(), "rg1");
    }
}
