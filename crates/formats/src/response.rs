use serde::{Deserialize, Serialize};

/// JSON body returned by the backend for the array-based formats.
///
/// `depth_values` is base64; whether it holds a compressed float blob or raw
/// normalized bytes depends on [`ResponseFormat`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepthResponse {
    pub width: u32,
    pub height: u32,
    pub depth_values: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_max: Option<f64>,
}

/// Wire encoding of the depth map in a successful `/upload` response.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// PNG body; depth in one 8-bit channel.
    ImageChannel,
    /// JSON body; zlib-compressed native-endian `f32` array.
    CompressedFloat,
    /// JSON body; one byte per pixel plus `depth_min`/`depth_max`.
    #[default]
    NormalizedByte,
    /// PNG body; 16-bit grayscale, `depth = word / scale`.
    Luma16,
}

impl ResponseFormat {
    pub const ALL: [ResponseFormat; 4] = [
        ResponseFormat::ImageChannel,
        ResponseFormat::CompressedFloat,
        ResponseFormat::NormalizedByte,
        ResponseFormat::Luma16,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ResponseFormat::ImageChannel => "image_channel",
            ResponseFormat::CompressedFloat => "compressed_float",
            ResponseFormat::NormalizedByte => "normalized_byte",
            ResponseFormat::Luma16 => "luma16",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn is_image(self) -> bool {
        matches!(self, ResponseFormat::ImageChannel | ResponseFormat::Luma16)
    }

    /// Media type the client asks for and the backend answers with.
    pub fn content_type(self) -> &'static str {
        if self.is_image() {
            "image/png"
        } else {
            "application/json"
        }
    }
}

impl std::fmt::Display for ResponseFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
