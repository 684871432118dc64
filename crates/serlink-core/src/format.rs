//! Pixel-format to bus data-type table.
//!
//! Every stream carried over the serial link is tagged with a MIPI CSI-2
//! data-type code. The table here maps the abstract [`PixelFormat`] names used
//! in topology descriptions to their on-bus [`DataType`] code, bit depth, and
//! whether the format supports 8/10/12-bit doubling on the link.
//!
//! Pixel formats additionally generate frame-start/frame-end marker packets on
//! the bus, so a remap table entry for a pixel format expands to three entries
//! (payload + both markers), while an embedded-data format expands to one.
//! [`PixelFormat::remap_entries`] encodes that rule.

use serde::{Deserialize, Serialize};

/// MIPI CSI-2 data-type codes used on the serial bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    /// Frame-start short packet marker.
    FrameStart = 0x00,
    /// Frame-end short packet marker.
    FrameEnd = 0x01,
    /// 8-bit embedded (non-image) data.
    Embedded8 = 0x12,
    /// YUV 4:2:2, 8 bits per component.
    Yuv422_8 = 0x1e,
    /// YUV 4:2:2, 10 bits per component.
    Yuv422_10 = 0x1f,
    /// RGB565 packed.
    Rgb565 = 0x22,
    /// RGB666 packed.
    Rgb666 = 0x23,
    /// RGB888 packed.
    Rgb888 = 0x24,
    /// 8-bit raw Bayer.
    Raw8 = 0x2a,
    /// 10-bit raw Bayer.
    Raw10 = 0x2b,
    /// 12-bit raw Bayer.
    Raw12 = 0x2c,
    /// 14-bit raw Bayer.
    Raw14 = 0x2d,
    /// 16-bit raw Bayer.
    Raw16 = 0x2e,
}

impl DataType {
    /// Returns the raw 6-bit bus code.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Looks up a data type by its bus code.
    pub fn from_code(code: u8) -> Option<Self> {
        use DataType::{
            Embedded8, FrameEnd, FrameStart, Raw8, Raw10, Raw12, Raw14, Raw16, Rgb565, Rgb666,
            Rgb888, Yuv422_8, Yuv422_10,
        };
        let dt = match code {
            0x00 => FrameStart,
            0x01 => FrameEnd,
            0x12 => Embedded8,
            0x1e => Yuv422_8,
            0x1f => Yuv422_10,
            0x22 => Rgb565,
            0x23 => Rgb666,
            0x24 => Rgb888,
            0x2a => Raw8,
            0x2b => Raw10,
            0x2c => Raw12,
            0x2d => Raw14,
            0x2e => Raw16,
            _ => return None,
        };
        Some(dt)
    }

    /// Whether this data type carries embedded (non-image) data.
    #[inline]
    pub fn is_embedded(self) -> bool {
        matches!(self, DataType::Embedded8)
    }
}

/// Abstract pixel formats selectable per channel in a topology description.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PixelFormat {
    /// Embedded (non-image) data, 8-bit.
    Embedded,
    /// YUYV 4:2:2, 16 bits per pixel.
    Yuyv8,
    /// YUYV 4:2:2, 20 bits per pixel.
    Yuyv10,
    /// RGB565, 16 bits per pixel.
    Rgb565,
    /// RGB666, 18 bits per pixel.
    Rgb666,
    /// RGB888, 24 bits per pixel.
    Rgb888,
    /// Raw Bayer, 8 bits per pixel.
    Raw8,
    /// Raw Bayer, 10 bits per pixel.
    Raw10,
    /// Raw Bayer, 12 bits per pixel.
    Raw12,
    /// Raw Bayer, 14 bits per pixel.
    Raw14,
    /// Raw Bayer, 16 bits per pixel.
    Raw16,
}

/// Static description of one pixel format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatInfo {
    /// The abstract format this entry describes.
    pub format: PixelFormat,
    /// On-bus data-type code for the payload packets.
    pub data_type: DataType,
    /// Bits per pixel on the bus.
    pub bpp: u8,
    /// Whether the link supports pixel-doubling this format.
    pub dbl: bool,
}

const FORMATS: &[FormatInfo] = &[
    FormatInfo {
        format: PixelFormat::Embedded,
        data_type: DataType::Embedded8,
        bpp: 8,
        dbl: true,
    },
    FormatInfo {
        format: PixelFormat::Yuyv8,
        data_type: DataType::Yuv422_8,
        bpp: 16,
        dbl: false,
    },
    FormatInfo {
        format: PixelFormat::Yuyv10,
        data_type: DataType::Yuv422_10,
        bpp: 20,
        dbl: false,
    },
    FormatInfo {
        format: PixelFormat::Rgb565,
        data_type: DataType::Rgb565,
        bpp: 16,
        dbl: false,
    },
    FormatInfo {
        format: PixelFormat::Rgb666,
        data_type: DataType::Rgb666,
        bpp: 18,
        dbl: false,
    },
    FormatInfo {
        format: PixelFormat::Rgb888,
        data_type: DataType::Rgb888,
        bpp: 24,
        dbl: false,
    },
    FormatInfo {
        format: PixelFormat::Raw8,
        data_type: DataType::Raw8,
        bpp: 8,
        dbl: true,
    },
    FormatInfo {
        format: PixelFormat::Raw10,
        data_type: DataType::Raw10,
        bpp: 10,
        dbl: true,
    },
    FormatInfo {
        format: PixelFormat::Raw12,
        data_type: DataType::Raw12,
        bpp: 12,
        dbl: true,
    },
    FormatInfo {
        format: PixelFormat::Raw14,
        data_type: DataType::Raw14,
        bpp: 14,
        dbl: false,
    },
    FormatInfo {
        format: PixelFormat::Raw16,
        data_type: DataType::Raw16,
        bpp: 16,
        dbl: false,
    },
];

impl PixelFormat {
    /// Returns the static table entry for this format.
    pub fn info(self) -> &'static FormatInfo {
        // The table covers every variant.
        FORMATS
            .iter()
            .find(|f| f.format == self)
            .unwrap_or(&FORMATS[0])
    }

    /// On-bus data-type code of the payload packets.
    #[inline]
    pub fn data_type(self) -> DataType {
        self.info().data_type
    }

    /// Bits per pixel on the bus.
    #[inline]
    pub fn bpp(self) -> u8 {
        self.info().bpp
    }

    /// Whether the format carries embedded (non-image) data.
    #[inline]
    pub fn is_embedded(self) -> bool {
        self.data_type().is_embedded()
    }

    /// Number of remap-table entries the format occupies.
    ///
    /// Pixel formats generate frame-start and frame-end markers alongside the
    /// payload, so they need three entries. Embedded data has no markers.
    #[inline]
    pub fn remap_entries(self) -> usize {
        if self.is_embedded() { 1 } else { 3 }
    }

    /// Looks up the format carrying the given payload data type.
    pub fn from_data_type(dt: DataType) -> Option<Self> {
        FORMATS.iter().find(|f| f.data_type == dt).map(|f| f.format)
    }

    /// Iterates over every known format's table entry.
    pub fn all() -> impl Iterator<Item = &'static FormatInfo> {
        FORMATS.iter()
    }
}
