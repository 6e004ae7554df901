//! Color rounding
//!
//! The console only has the 16 base colors; indexed and true-color requests
//! are rounded to the nearest of them.

/// xterm default RGB values of the 16 base colors.
const BASE_COLORS: [(u8, u8, u8); 16] = [
    (0, 0, 0),
    (205, 0, 0),
    (0, 205, 0),
    (205, 205, 0),
    (0, 0, 238),
    (205, 0, 205),
    (0, 205, 205),
    (229, 229, 229),
    (127, 127, 127),
    (255, 0, 0),
    (0, 255, 0),
    (255, 255, 0),
    (92, 92, 255),
    (255, 0, 255),
    (0, 255, 255),
    (255, 255, 255),
];

const CUBE_LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];

/// RGB value of an xterm 256-color palette index.
pub fn palette_rgb(index: u8) -> (u8, u8, u8) {
    match index {
        0..=15 => BASE_COLORS[index as usize],
        16..=231 => {
            let i = index - 16;
            (
                CUBE_LEVELS[(i / 36) as usize],
                CUBE_LEVELS[((i / 6) % 6) as usize],
                CUBE_LEVELS[(i % 6) as usize],
            )
        }
        232..=255 => {
            let level = 8 + 10 * (index - 232);
            (level, level, level)
        }
    }
}

/// Round a palette index to one of the 16 base colors.
pub fn round_color(index: u8) -> u8 {
    if index < 16 {
        return index;
    }
    let (r, g, b) = palette_rgb(index);
    round_rgb(r, g, b)
}

/// Round a true color to the nearest of the 16 base colors.
pub fn round_rgb(r: u8, g: u8, b: u8) -> u8 {
    let mut best = 0u8;
    let mut best_distance = u32::MAX;
    for (i, &(br, bg, bb)) in BASE_COLORS.iter().enumerate() {
        let d = distance((r, g, b), (br, bg, bb));
        if d < best_distance {
            best_distance = d;
            best = i as u8;
        }
    }
    best
}

/// "Redmean" weighted squared distance, scaled by 256.
fn distance(a: (u8, u8, u8), b: (u8, u8, u8)) -> u32 {
    let rmean = (u32::from(a.0) + u32::from(b.0)) / 2;
    let dr = i32::from(a.0) - i32::from(b.0);
    let dg = i32::from(a.1) - i32::from(b.1);
    let db = i32::from(a.2) - i32::from(b.2);
    let (dr2, dg2, db2) = ((dr * dr) as u32, (dg * dg) as u32, (db * db) as u32);
    (512 + rmean) * dr2 + 1024 * dg2 + (767 - rmean) * db2
}
