use crate::RasterError;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InkColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl InkColor {
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    pub const BLUE: Self = Self::rgb(0, 0, 255);
    pub const NAVY: Self = Self::rgb(0, 0, 128);
    pub const RED: Self = Self::rgb(255, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub(crate) fn to_paint(self) -> tiny_skia::Paint<'static> {
        let mut paint = tiny_skia::Paint::default();
        paint.set_color_rgba8(self.r, self.g, self.b, self.a);
        paint.anti_alias = true;
        paint
    }
}

impl Default for InkColor {
    fn default() -> Self {
        Self::BLACK
    }
}

/// Parses `#rrggbb`, `rgb(r, g, b)` or one of a few color names.
impl FromStr for InkColor {
    type Err = RasterError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let invalid = || RasterError::Color(value.to_owned());

        if let Some(hex) = trimmed.strip_prefix('#') {
            if hex.len() != 6 || !hex.is_ascii() {
                return Err(invalid());
            }
            let channel = |range: std::ops::Range<usize>| {
                u8::from_str_radix(&hex[range], 16).map_err(|_| invalid())
            };
            return Ok(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?));
        }

        if let Some(inner) = trimmed.strip_prefix("rgb(").and_then(|rest| rest.strip_suffix(')')) {
            let channels = inner
                .split(',')
                .map(|part| part.trim().parse::<u8>().map_err(|_| invalid()))
                .collect::<Result<Vec<_>, _>>()?;
            let [r, g, b] = channels.as_slice() else {
                return Err(invalid());
            };
            return Ok(Self::rgb(*r, *g, *b));
        }

        match trimmed.to_ascii_lowercase().as_str() {
            "black" => Ok(Self::BLACK),
            "blue" => Ok(Self::BLUE),
            "navy" => Ok(Self::NAVY),
            "red" => Ok(Self::RED),
            _ => Err(invalid()),
        }
    }
}
