//! Console attribute word
//!
//! Low nibble: foreground blue/green/red/intensity. Next nibble: the same for
//! the background. The high byte holds DBCS and grid flags that are carried
//! through untouched.

pub const FOREGROUND_BLUE: u16 = 0x0001;
pub const FOREGROUND_GREEN: u16 = 0x0002;
pub const FOREGROUND_RED: u16 = 0x0004;
pub const FOREGROUND_INTENSITY: u16 = 0x0008;
pub const BACKGROUND_INTENSITY: u16 = 0x0080;

const FOREGROUND_MASK: u16 = 0x000F;
const BACKGROUND_MASK: u16 = 0x00F0;

/// ANSI color number (0-7) to console foreground bits.
const ANSI_TO_CONSOLE: [u16; 8] = [
    0,                                                   // black
    FOREGROUND_RED,                                      // red
    FOREGROUND_GREEN,                                    // green
    FOREGROUND_RED | FOREGROUND_GREEN,                   // yellow
    FOREGROUND_BLUE,                                     // blue
    FOREGROUND_RED | FOREGROUND_BLUE,                    // magenta
    FOREGROUND_GREEN | FOREGROUND_BLUE,                  // cyan
    FOREGROUND_RED | FOREGROUND_GREEN | FOREGROUND_BLUE, // white
];

/// Rendering flags the console cannot express natively.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Emphasis {
    pub bold: bool,
    pub underline: bool,
    pub negative: bool,
}

/// Swap the foreground and background nibbles.
pub fn invert(attributes: u16) -> u16 {
    let fg = (attributes & FOREGROUND_MASK) << 4;
    let bg = (attributes & BACKGROUND_MASK) >> 4;
    (attributes & 0xFF00) | fg | bg
}

/// Set the foreground from a 16-color index.
pub fn with_foreground(attributes: u16, color: u8) -> u16 {
    let bits = ANSI_TO_CONSOLE[(color & 0x07) as usize];
    let intensity = if color >= 8 { FOREGROUND_INTENSITY } else { 0 };
    (attributes & !FOREGROUND_MASK) | bits | intensity
}

/// Set the background from a 16-color index.
pub fn with_background(attributes: u16, color: u8) -> u16 {
    let bits = ANSI_TO_CONSOLE[(color & 0x07) as usize] << 4;
    let intensity = if color >= 8 { BACKGROUND_INTENSITY } else { 0 };
    (attributes & !BACKGROUND_MASK) | bits | intensity
}

/// Restore the foreground nibble from `original`.
pub fn default_foreground(attributes: u16, original: u16) -> u16 {
    (attributes & !FOREGROUND_MASK) | (original & FOREGROUND_MASK)
}

/// Restore the background nibble from `original`.
pub fn default_background(attributes: u16, original: u16) -> u16 {
    (attributes & !BACKGROUND_MASK) | (original & BACKGROUND_MASK)
}

/// Restore both color nibbles from `original`.
pub fn reset(attributes: u16, original: u16) -> u16 {
    (attributes & 0xFF00) | (original & 0x00FF)
}

/// Attribute word to hand to the console for a logical word plus emphasis.
///
/// Bold forces foreground intensity, underline forces background intensity,
/// negative swaps the nibbles last.
pub fn compose(attributes: u16, emphasis: Emphasis) -> u16 {
    let mut out = attributes;
    if emphasis.bold {
        out |= FOREGROUND_INTENSITY;
    }
    if emphasis.underline {
        out |= BACKGROUND_INTENSITY;
    }
    if emphasis.negative {
        out = invert(out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invert_is_an_involution() {
        for word in 0..=u16::MAX {
            assert_eq!(invert(invert(word)), word);
            assert_eq!(invert(word) & 0xFF00, word & 0xFF00);
        }
        assert_eq!(invert(0x1207), 0x1270);
    }

    #[test]
    fn test_foreground_color_mapping() {
        assert_eq!(with_foreground(0x0070, 1), 0x0070 | FOREGROUND_RED);
        assert_eq!(with_foreground(0x0007, 3), FOREGROUND_RED | FOREGROUND_GREEN);
        assert_eq!(with_foreground(0x0007, 12), FOREGROUND_BLUE | FOREGROUND_INTENSITY);
    }

    #[test]
    fn test_background_color_mapping() {
        assert_eq!(with_background(0x0007, 4), 0x0017);
        assert_eq!(with_background(0x0007, 14), 0x0007 | 0x0030 | BACKGROUND_INTENSITY);
        assert_eq!(with_background(0x0007, 11), 0x0007 | 0x0060 | BACKGROUND_INTENSITY);
    }

    #[test]
    fn test_default_colors_restore_one_nibble() {
        let original = 0x0017;
        let changed = with_background(with_foreground(original, 9), 2);
        assert_eq!(default_foreground(changed, original) & 0x000F, 0x0007);
        assert_eq!(default_foreground(changed, original) & 0x00F0, 0x0020);
        assert_eq!(default_background(changed, original) & 0x00F0, 0x0010);
        assert_eq!(reset(changed | 0x4000, original), 0x4017);
    }

    #[test]
    fn test_compose_emphasis() {
        let bold = Emphasis { bold: true, ..Emphasis::default() };
        assert_eq!(compose(0x0007, bold), 0x000F);

        let underline = Emphasis { underline: true, ..Emphasis::default() };
        assert_eq!(compose(0x0007, underline), 0x0087);

        let negative = Emphasis { negative: true, ..Emphasis::default() };
        assert_eq!(compose(0x0017, negative), 0x0071);
    }
}
