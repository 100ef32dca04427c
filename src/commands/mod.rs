mod config_cmd;
mod grpo;
mod picklist;
mod scan;
mod sync_cmd;
mod transfer;

pub use config_cmd::ConfigCommand;
pub use grpo::GrpoCommand;
pub use picklist::PickListCommand;
pub use scan::ScanCommand;
pub use sync_cmd::SyncCommand;
pub use transfer::TransferCommand;

/// Parse a line-item argument of the form `CODE:QTY` or `CODE:QTY:BIN`.
pub(crate) fn parse_item_spec(spec: &str) -> Result<(String, f64, Option<String>), String> {
    let mut parts = spec.splitn(3, ':');
    let code = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("invalid item spec '{}': missing item code", spec))?;
    let qty: f64 = parts
        .next()
        .ok_or_else(|| format!("invalid item spec '{}': missing quantity", spec))?
        .parse()
        .map_err(|_| format!("invalid item spec '{}': quantity is not a number", spec))?;
    let bin = parts.next().map(|s| s.to_string());
    Ok((code.to_string(), qty, bin))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_item_spec() {
        assert_eq!(
            parse_item_spec("ITEM-A:5").unwrap(),
            ("ITEM-A".into(), 5.0, None)
        );
        assert_eq!(
            parse_item_spec("ITEM-B:2.5:A-01-01").unwrap(),
            ("ITEM-B".into(), 2.5, Some("A-01-01".into()))
        );
        assert!(parse_item_spec("ITEM-A").is_err());
        assert!(parse_item_spec("ITEM-A:lots").is_err());
        assert!(parse_item_spec(":5").is_err());
    }
}
