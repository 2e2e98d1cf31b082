use crate::{Error, Result};
use std::{fmt, str::FromStr};

/// Tile payload formats an MBTiles tileset can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileFormat {
    Png,
    Jpg,
    Json,
    Pbf,
}

impl TileFormat {
    pub const ALL: [TileFormat; 4] = [Self::Png, Self::Jpg, Self::Json, Self::Pbf];

    /// Token stored in the `format` metadata row.
    pub fn token(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Json => "json",
            Self::Pbf => "pbf",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpg => "image/jpeg",
            Self::Json => "application/json",
            Self::Pbf => "application/x-protobuf",
        }
    }

    /// Canonical encoder name used when a response is saved.
    pub fn encoder(self) -> &'static str {
        match self {
            Self::Png => "PNG",
            Self::Jpg => "JPEG",
            Self::Json => "JSON",
            Self::Pbf => "PBF",
        }
    }

    /// Looks up a file extension, ignoring case.
    pub fn from_extension(extension: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.token().eq_ignore_ascii_case(extension))
            .ok_or_else(|| Error::UnsupportedFormat(extension.to_owned()))
    }

    pub fn from_mime_type(mime_type: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.mime_type() == mime_type)
            .ok_or_else(|| Error::UnsupportedFormat(mime_type.to_owned()))
    }
}

impl FromStr for TileFormat {
    type Err = Error;

    /// Parses a metadata token exactly as stored.
    fn from_str(token: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.token() == token)
            .ok_or_else(|| Error::UnsupportedFormat(token.to_owned()))
    }
}

impl fmt::Display for TileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("png", "image/png", "PNG")]
    #[case("jpg", "image/jpeg", "JPEG")]
    #[case("json", "application/json", "JSON")]
    #[case("pbf", "application/x-protobuf", "PBF")]
    fn maps_tokens(#[case] token: &str, #[case] mime_type: &str, #[case] encoder: &str) {
        let format: TileFormat = token.parse().expect("known token");

        assert_eq!(format.mime_type(), mime_type);
        assert_eq!(format.encoder(), encoder);
        assert_eq!(format.to_string(), token);
        assert_eq!(TileFormat::from_mime_type(mime_type).expect("known mime"), format);
    }

    #[rstest]
    #[case("PNG", TileFormat::Png)]
    #[case("Jpg", TileFormat::Jpg)]
    #[case("jSoN", TileFormat::Json)]
    #[case("pbf", TileFormat::Pbf)]
    fn extensions_ignore_case(#[case] extension: &str, #[case] expected: TileFormat) {
        assert_eq!(TileFormat::from_extension(extension).expect("known"), expected);
    }

    #[rstest]
    #[case("gif")]
    #[case("jpeg")]
    #[case("")]
    fn rejects_unknown_extensions(#[case] extension: &str) {
        match TileFormat::from_extension(extension) {
            Err(Error::UnsupportedFormat(token)) => assert_eq!(token, extension),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn tokens_are_case_sensitive() {
        assert!(matches!(
            "PNG".parse::<TileFormat>(),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn rejects_unknown_mime_type() {
        assert!(matches!(
            TileFormat::from_mime_type("image/webp"),
            Err(Error::UnsupportedFormat(_))
        ));
    }
}
