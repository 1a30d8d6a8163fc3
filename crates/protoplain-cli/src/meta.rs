use anyhow::{bail, Context, Result};
use clap::Subcommand;
use protoplain_runtime::field_meta::{MAX_DEPTH, MAX_PATH_INDEX};
use protoplain_runtime::{FieldMeta, Origin};

#[derive(Subcommand)]
pub enum MetaCommands {
    /// Unpack a metadata word (hex with `0x`, or decimal).
    Decode { word: String },

    /// Pack origin/depth/path index into a word.
    Encode {
        /// Origin name (`embed`, `oneof_embed`, ...) or tag number.
        #[arg(long)]
        origin: String,
        #[arg(long, default_value_t = 0)]
        depth: u16,
        #[arg(long, default_value_t = 0)]
        index: u16,
    },
}

pub fn cmd_meta(command: MetaCommands) -> Result<()> {
    match command {
        MetaCommands::Decode { word } => {
            println!("{}", describe(parse_word(&word)?));
            Ok(())
        }
        MetaCommands::Encode {
            origin,
            depth,
            index,
        } => {
            let meta = encode(&origin, depth, index)?;
            println!("0x{:04x}", meta.raw());
            Ok(())
        }
    }
}

pub fn parse_word(text: &str) -> Result<FieldMeta> {
    let text = text.trim();
    let raw = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => text.parse::<u16>(),
    }
    .with_context(|| format!("not a 16-bit word: {text:?}"))?;
    Ok(FieldMeta::from_raw(raw))
}

pub fn encode(origin: &str, depth: u16, index: u16) -> Result<FieldMeta> {
    let origin: Origin = origin.parse()?;
    if depth > MAX_DEPTH {
        bail!("depth {depth} exceeds {MAX_DEPTH}");
    }
    if index > MAX_PATH_INDEX {
        bail!("path index {index} exceeds {MAX_PATH_INDEX}");
    }
    Ok(FieldMeta::new(origin, depth, index))
}

pub fn describe(meta: FieldMeta) -> String {
    let origin = match meta.origin() {
        Some(origin) => origin.to_string(),
        None => format!("reserved({})", meta.origin_bits()),
    };
    format!(
        "0x{:04x} origin={origin} depth={} path_index={}",
        meta.raw(),
        meta.depth(),
        meta.path_index()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_and_decimal_words_parse() {
        assert_eq!(parse_word("0x2805").unwrap().raw(), 0x2805);
        assert_eq!(parse_word("10245").unwrap().raw(), 0x2805);
        assert!(parse_word("0x1ffff").is_err());
        assert!(parse_word("embed").is_err());
    }

    #[test]
    fn describe_names_reserved_origins() {
        assert_eq!(
            describe(FieldMeta::from_raw(0x3005)),
            "0x3005 origin=embed depth=2 path_index=5"
        );
        assert_eq!(
            describe(FieldMeta::from_raw(0xE000)),
            "0xe000 origin=reserved(7) depth=0 path_index=0"
        );
    }

    #[test]
    fn encode_checks_ranges() {
        assert_eq!(encode("oneof_embed", 1, 2).unwrap().raw(), 0x4802);
        assert_eq!(encode("1", 3, 2047).unwrap().raw(), 0x3fff);
        assert!(encode("embed", 4, 0).is_err());
        assert!(encode("embed", 1, 2048).is_err());
        let err = encode("bogus", 0, 0).unwrap_err();
        assert_eq!(err.to_string(), "unknown origin: \"bogus\"");
    }
}
