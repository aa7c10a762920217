//! Konform Checks: WCAG 2.1 Contrast Math
//!
//! Exact sRGB relative-luminance computation per WCAG 2.1:
//! linearize `c' = c/12.92` for `c <= 0.03928`, else `((c+0.055)/1.055)^2.4`;
//! luminance `0.2126 R + 0.7152 G + 0.0722 B`;
//! ratio `(L_max + 0.05) / (L_min + 0.05)`.
//!
//! Color inputs accept `#rgb`, `#rrggbb`, `rgb()`, `rgba()` (alpha
//! composited against white) and a fixed table of named colors.

/// AA threshold for normal text.
pub const RATIO_NORMAL_TEXT: f64 = 4.5;
/// AA threshold for large text (>= 18 pt, or >= 14 pt bold).
pub const RATIO_LARGE_TEXT: f64 = 3.0;
/// Enhanced threshold targeted by generated color suggestions.
pub const RATIO_SUGGESTION_NORMAL: f64 = 7.0;
/// Enhanced threshold for large-text suggestions.
pub const RATIO_SUGGESTION_LARGE: f64 = 4.5;

/// An sRGB color with 8-bit channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

const NAMED_COLORS: &[(&str, Rgb)] = &[
    ("black", Rgb { r: 0, g: 0, b: 0 }),
    ("white", Rgb { r: 255, g: 255, b: 255 }),
    ("red", Rgb { r: 255, g: 0, b: 0 }),
    ("green", Rgb { r: 0, g: 128, b: 0 }),
    ("blue", Rgb { r: 0, g: 0, b: 255 }),
    ("yellow", Rgb { r: 255, g: 255, b: 0 }),
    ("orange", Rgb { r: 255, g: 165, b: 0 }),
    ("purple", Rgb { r: 128, g: 0, b: 128 }),
    ("gray", Rgb { r: 128, g: 128, b: 128 }),
    ("grey", Rgb { r: 128, g: 128, b: 128 }),
    ("silver", Rgb { r: 192, g: 192, b: 192 }),
    ("maroon", Rgb { r: 128, g: 0, b: 0 }),
    ("navy", Rgb { r: 0, g: 0, b: 128 }),
    ("teal", Rgb { r: 0, g: 128, b: 128 }),
    ("olive", Rgb { r: 128, g: 128, b: 0 }),
    ("lime", Rgb { r: 0, g: 255, b: 0 }),
    ("aqua", Rgb { r: 0, g: 255, b: 255 }),
    ("cyan", Rgb { r: 0, g: 255, b: 255 }),
    ("fuchsia", Rgb { r: 255, g: 0, b: 255 }),
    ("magenta", Rgb { r: 255, g: 0, b: 255 }),
    ("darkgray", Rgb { r: 169, g: 169, b: 169 }),
    ("lightgray", Rgb { r: 211, g: 211, b: 211 }),
    ("transparent", Rgb { r: 255, g: 255, b: 255 }),
];

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

fn parse_hex(hex: &str) -> Option<Rgb> {
    let digits = hex.as_bytes();
    match digits.len() {
        3 => {
            let r = hex_digit(digits[0])?;
            let g = hex_digit(digits[1])?;
            let b = hex_digit(digits[2])?;
            Some(Rgb {
                r: r * 17,
                g: g * 17,
                b: b * 17,
            })
        }
        6 => {
            let r = hex_digit(digits[0])? * 16 + hex_digit(digits[1])?;
            let g = hex_digit(digits[2])? * 16 + hex_digit(digits[3])?;
            let b = hex_digit(digits[4])? * 16 + hex_digit(digits[5])?;
            Some(Rgb { r, g, b })
        }
        _ => None,
    }
}

fn parse_rgb_func(input: &str) -> Option<Rgb> {
    let open = input.find('(')?;
    let close = input.rfind(')')?;
    let args: Vec<&str> = input[open + 1..close]
        .split([',', '/', ' '])
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .collect();
    if args.len() < 3 {
        return None;
    }
    let channel = |s: &str| -> Option<f64> {
        if let Some(pct) = s.strip_suffix('%') {
            pct.parse::<f64>().ok().map(|v| v * 255.0 / 100.0)
        } else {
            s.parse::<f64>().ok()
        }
    };
    let r = channel(args[0])?;
    let g = channel(args[1])?;
    let b = channel(args[2])?;
    let alpha = if args.len() >= 4 {
        let a = args[3];
        if let Some(pct) = a.strip_suffix('%') {
            pct.parse::<f64>().ok().map(|v| v / 100.0)?
        } else {
            a.parse::<f64>().ok()?
        }
    } else {
        1.0
    };
    // Composite semi-transparent colors against white
    let blend = |c: f64| -> u8 {
        let mixed = c * alpha + 255.0 * (1.0 - alpha);
        mixed.round().clamp(0.0, 255.0) as u8
    };
    Some(Rgb {
        r: blend(r),
        g: blend(g),
        b: blend(b),
    })
}

/// Parse a CSS color value. Returns `None` for unsupported syntax
/// (gradients, `var()`, `currentColor`).
pub fn parse_color(value: &str) -> Option<Rgb> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('#') {
        return parse_hex(hex);
    }
    let lower = value.to_ascii_lowercase();
    if lower.starts_with("rgb(") || lower.starts_with("rgba(") {
        return parse_rgb_func(&lower);
    }
    NAMED_COLORS
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|(_, rgb)| *rgb)
}

fn linearize(channel: u8) -> f64 {
    let c = f64::from(channel) / 255.0;
    if c <= 0.03928 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

/// WCAG relative luminance of a color.
pub fn relative_luminance(color: Rgb) -> f64 {
    0.2126 * linearize(color.r) + 0.7152 * linearize(color.g) + 0.0722 * linearize(color.b)
}

/// Contrast ratio between two colors, in `[1, 21]`.
pub fn contrast_ratio(a: Rgb, b: Rgb) -> f64 {
    let la = relative_luminance(a);
    let lb = relative_luminance(b);
    let (max, min) = if la >= lb { (la, lb) } else { (lb, la) };
    (max + 0.05) / (min + 0.05)
}

/// Required AA ratio for the given text size class.
pub fn required_ratio(large_text: bool) -> f64 {
    if large_text {
        RATIO_LARGE_TEXT
    } else {
        RATIO_NORMAL_TEXT
    }
}

// HSL conversion for hue-preserving darkening

fn rgb_to_hsl(color: Rgb) -> (f64, f64, f64) {
    let r = f64::from(color.r) / 255.0;
    let g = f64::from(color.g) / 255.0;
    let b = f64::from(color.b) / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let l = (max + min) / 2.0;
    if (max - min).abs() < f64::EPSILON {
        return (0.0, 0.0, l);
    }
    let d = max - min;
    let s = if l > 0.5 {
        d / (2.0 - max - min)
    } else {
        d / (max + min)
    };
    let h = if (max - r).abs() < f64::EPSILON {
        ((g - b) / d + if g < b { 6.0 } else { 0.0 }) / 6.0
    } else if (max - g).abs() < f64::EPSILON {
        ((b - r) / d + 2.0) / 6.0
    } else {
        ((r - g) / d + 4.0) / 6.0
    };
    (h, s, l)
}

fn hue_to_channel(p: f64, q: f64, mut t: f64) -> f64 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

fn hsl_to_rgb(h: f64, s: f64, l: f64) -> Rgb {
    if s < f64::EPSILON {
        let v = (l * 255.0).round().clamp(0.0, 255.0) as u8;
        return Rgb { r: v, g: v, b: v };
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let to_byte = |c: f64| (c * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgb {
        r: to_byte(hue_to_channel(p, q, h + 1.0 / 3.0)),
        g: to_byte(hue_to_channel(p, q, h)),
        b: to_byte(hue_to_channel(p, q, h - 1.0 / 3.0)),
    }
}

/// Minimal-darkening foreground adjustment that reaches `target_ratio`
/// against `background` while preserving hue. Binary search on HSL
/// lightness, darkening only. Returns `None` when even black cannot reach
/// the target (very dark backgrounds).
pub fn suggest_foreground(foreground: Rgb, background: Rgb, target_ratio: f64) -> Option<Rgb> {
    if contrast_ratio(foreground, background) >= target_ratio {
        return Some(foreground);
    }
    let (h, s, l) = rgb_to_hsl(foreground);
    if contrast_ratio(Rgb::BLACK, background) < target_ratio {
        return None;
    }

    // Highest lightness (<= current) that still meets the target
    let mut lo = 0.0f64;
    let mut hi = l;
    for _ in 0..18 {
        let mid = (lo + hi) / 2.0;
        let candidate = hsl_to_rgb(h, s, mid);
        if contrast_ratio(candidate, background) >= target_ratio {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    // Quantization to 8-bit channels can land a hair short; nudge down
    let mut lightness = lo;
    let mut candidate = hsl_to_rgb(h, s, lightness);
    while contrast_ratio(candidate, background) < target_ratio && lightness > 0.0 {
        lightness = (lightness - 0.005).max(0.0);
        candidate = hsl_to_rgb(h, s, lightness);
    }
    Some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Rgb {
        parse_color(s).unwrap()
    }

    #[test]
    fn test_reference_ratios() {
        // Literal reference pairs, tolerance 0.01
        let cases = [
            ("#000000", "#FFFFFF", 21.00),
            ("#777777", "#FFFFFF", 4.48),
            ("#595959", "#FFFFFF", 7.00),
            ("#0066CC", "#FFFFFF", 5.57),
        ];
        for (fg, bg, expected) in cases {
            let ratio = contrast_ratio(hex(fg), hex(bg));
            assert!(
                (ratio - expected).abs() < 0.01,
                "{fg} on {bg}: got {ratio:.4}, expected {expected}"
            );
        }
    }

    #[test]
    fn test_thresholds() {
        assert!(contrast_ratio(hex("#777777"), Rgb::WHITE) < RATIO_NORMAL_TEXT);
        assert!(contrast_ratio(hex("#0066CC"), Rgb::WHITE) >= RATIO_NORMAL_TEXT);
        assert!(contrast_ratio(hex("#777777"), Rgb::WHITE) >= RATIO_LARGE_TEXT);
    }

    #[test]
    fn test_color_parsing_forms() {
        assert_eq!(parse_color("#fff"), Some(Rgb::WHITE));
        assert_eq!(parse_color("#ffffff"), Some(Rgb::WHITE));
        assert_eq!(
            parse_color("rgb(255, 0, 0)"),
            Some(Rgb { r: 255, g: 0, b: 0 })
        );
        assert_eq!(parse_color("white"), Some(Rgb::WHITE));
        assert_eq!(parse_color("Black"), Some(Rgb::BLACK));
        assert_eq!(parse_color("url(#gradient)"), None);
        assert_eq!(parse_color("var(--text)"), None);
    }

    #[test]
    fn test_rgba_composites_against_white() {
        // Half-transparent black over white ~= mid gray
        let composited = parse_color("rgba(0, 0, 0, 0.5)").unwrap();
        assert_eq!(composited, Rgb { r: 128, g: 128, b: 128 });
        // Fully opaque alpha is a no-op
        assert_eq!(parse_color("rgba(10, 20, 30, 1)"), Some(Rgb { r: 10, g: 20, b: 30 }));
    }

    #[test]
    fn test_suggestion_meets_enhanced_target() {
        let suggested =
            suggest_foreground(hex("#777777"), Rgb::WHITE, RATIO_SUGGESTION_NORMAL).unwrap();
        let ratio = contrast_ratio(suggested, Rgb::WHITE);
        assert!(ratio >= 7.0, "suggested {} only reaches {ratio:.2}", suggested.to_hex());
        // Must not be lighter than the canonical 7.0 gray
        assert!(relative_luminance(suggested) <= relative_luminance(hex("#595959")) + 1e-4);
        // Gray input stays gray
        assert_eq!(suggested.r, suggested.g);
        assert_eq!(suggested.g, suggested.b);
    }

    #[test]
    fn test_suggestion_noop_when_already_passing() {
        let fg = hex("#0066CC");
        assert_eq!(suggest_foreground(fg, Rgb::WHITE, 4.5), Some(fg));
    }

    #[test]
    fn test_suggestion_impossible_on_black() {
        assert!(suggest_foreground(hex("#777777"), Rgb::BLACK, 7.0).is_none());
    }

    #[test]
    fn test_hsl_roundtrip_preserves_hue() {
        let blue = hex("#0066CC");
        let suggested = suggest_foreground(blue, Rgb::WHITE, 7.0).unwrap();
        let (h_in, _, _) = rgb_to_hsl(blue);
        let (h_out, _, _) = rgb_to_hsl(suggested);
        assert!((h_in - h_out).abs() < 0.02, "hue drifted: {h_in} -> {h_out}");
    }
}
