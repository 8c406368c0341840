//! Chroma-key compositor: replaces keyed foreground pixels with background.
//!
//! Compositing is a pure per-pixel pass. For every pixel index the rule is
//! evaluated on the foreground color; keyed pixels take the background's
//! red, green and blue, everything else keeps the foreground color. Alpha
//! always comes from the foreground.

use chromacast_common::error::ChromacastResult;
use chromacast_media_model::{ChromaKeyRule, Frame, BYTES_PER_PIXEL};

/// Composite `fg` over `bg` into a new frame.
///
/// Fails with `DimensionMismatch` when the frames differ in size; no
/// output is produced in that case.
pub fn composite(fg: &Frame, bg: &Frame, rule: &ChromaKeyRule) -> ChromacastResult<Frame> {
    fg.ensure_same_size(bg)?;
    let mut out = fg.clone();
    key_pixels(out.as_bytes_mut(), bg.as_bytes(), rule);
    Ok(out)
}

/// Composite into an existing frame, reusing its buffer.
///
/// `out` must have the same dimensions as both inputs. Returns the number
/// of keyed pixels.
pub fn composite_into(
    fg: &Frame,
    bg: &Frame,
    rule: &ChromaKeyRule,
    out: &mut Frame,
) -> ChromacastResult<usize> {
    fg.ensure_same_size(bg)?;
    fg.ensure_same_size(out)?;
    out.as_bytes_mut().copy_from_slice(fg.as_bytes());
    Ok(key_pixels(out.as_bytes_mut(), bg.as_bytes(), rule))
}

/// Number of pixels in `frame` the rule would replace.
pub fn key_coverage(frame: &Frame, rule: &ChromaKeyRule) -> usize {
    frame
        .as_bytes()
        .chunks_exact(BYTES_PER_PIXEL)
        .filter(|px| rule.matches(px[0], px[1], px[2]))
        .count()
}

fn key_pixels(out: &mut [u8], bg: &[u8], rule: &ChromaKeyRule) -> usize {
    let mut keyed = 0;
    for (px, bg_px) in out
        .chunks_exact_mut(BYTES_PER_PIXEL)
        .zip(bg.chunks_exact(BYTES_PER_PIXEL))
    {
        if rule.matches(px[0], px[1], px[2]) {
            px[..3].copy_from_slice(&bg_px[..3]);
            keyed += 1;
        }
    }
    keyed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chromacast_common::error::ChromacastError;
    use chromacast_media_model::{Dimensions, Rgba};
    use proptest::prelude::*;

    const RULE: ChromaKeyRule = ChromaKeyRule::new();

    #[test]
    fn test_key_block_takes_background_color() {
        let dims = Dimensions::new(6, 4);
        let mut fg = Frame::filled(dims, Rgba::new(90, 90, 90, 200));
        fg.fill_rect(2, 1, 2, 2, Rgba::new(20, 175, 0, 128));
        let bg = Frame::filled(dims, Rgba::new(200, 50, 10, 255));

        let out = composite(&fg, &bg, &RULE).unwrap();

        for y in 0..dims.height {
            for x in 0..dims.width {
                let px = out.pixel(x, y).unwrap();
                if (2..4).contains(&x) && (1..3).contains(&y) {
                    assert_eq!(px, Rgba::new(200, 50, 10, 128), "keyed pixel ({x},{y})");
                } else {
                    assert_eq!(px, fg.pixel(x, y).unwrap(), "passthrough pixel ({x},{y})");
                }
            }
        }
    }

    #[test]
    fn test_threshold_boundaries_pass_through() {
        let dims = Dimensions::new(4, 1);
        let mut fg = Frame::blank(dims);
        fg.set_pixel(0, 0, Rgba::new(45, 175, 0, 255));
        fg.set_pixel(1, 0, Rgba::new(20, 170, 0, 255));
        fg.set_pixel(2, 0, Rgba::new(20, 180, 0, 255));
        fg.set_pixel(3, 0, Rgba::new(20, 175, 1, 255));
        let bg = Frame::filled(dims, Rgba::opaque(255, 255, 255));

        let out = composite(&fg, &bg, &RULE).unwrap();
        assert_eq!(out, fg);
        assert_eq!(key_coverage(&fg, &RULE), 0);
    }

    #[test]
    fn test_mismatched_dimensions_fail() {
        let fg = Frame::blank(Dimensions::new(800, 450));
        let bg = Frame::blank(Dimensions::new(640, 360));
        let err = composite(&fg, &bg, &RULE).unwrap_err();
        assert!(matches!(
            err,
            ChromacastError::DimensionMismatch {
                expected: (800, 450),
                actual: (640, 360)
            }
        ));
    }

    #[test]
    fn test_composite_into_checks_output_size() {
        let dims = Dimensions::new(2, 2);
        let fg = Frame::blank(dims);
        let bg = Frame::blank(dims);
        let mut out = Frame::blank(Dimensions::new(3, 3));
        assert!(composite_into(&fg, &bg, &RULE, &mut out).is_err());
        assert!(out.is_blank());
    }

    #[test]
    fn test_composite_into_reports_keyed_pixels() {
        let dims = Dimensions::new(3, 3);
        let mut fg = Frame::filled(dims, Rgba::opaque(10, 10, 10));
        fg.fill_rect(0, 0, 3, 1, Rgba::opaque(0, 172, 0));
        let bg = Frame::filled(dims, Rgba::opaque(1, 2, 3));
        let mut out = Frame::blank(dims);

        let keyed = composite_into(&fg, &bg, &RULE, &mut out).unwrap();
        assert_eq!(keyed, 3);
        assert_eq!(key_coverage(&fg, &RULE), 3);
        assert_eq!(out, composite(&fg, &bg, &RULE).unwrap());
    }

    fn frame_strategy(dims: Dimensions) -> impl Strategy<Value = Frame> {
        proptest::collection::vec(any::<u8>(), dims.byte_len())
            .prop_map(move |bytes| Frame::from_rgba(dims, bytes).unwrap())
    }

    proptest! {
        #[test]
        fn prop_composite_is_deterministic(
            fg in frame_strategy(Dimensions::new(5, 3)),
            bg in frame_strategy(Dimensions::new(5, 3)),
        ) {
            let a = composite(&fg, &bg, &RULE).unwrap();
            let b = composite(&fg, &bg, &RULE).unwrap();
            prop_assert_eq!(a.as_bytes(), b.as_bytes());
        }

        #[test]
        fn prop_each_pixel_follows_rule(
            fg in frame_strategy(Dimensions::new(4, 4)),
            bg in frame_strategy(Dimensions::new(4, 4)),
        ) {
            let out = composite(&fg, &bg, &RULE).unwrap();
            for ((o, f), b) in out.pixels().zip(fg.pixels()).zip(bg.pixels()) {
                prop_assert_eq!(o.a, f.a);
                if RULE.matches_pixel(f) {
                    prop_assert_eq!((o.r, o.g, o.b), (b.r, b.g, b.b));
                } else {
                    prop_assert_eq!(o, f);
                }
            }
        }
    }
}
