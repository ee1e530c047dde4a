//! Property-based coverage for fitting and rotation arithmetic.

use page_render::pipeline::{fit_in_rectangle, fitting_size, ColorEngine, FitOptions, Rotation};
use page_render::pipeline::buffer::{DecodedImage, ImageBuffer, PixelFormat};
use proptest::prelude::*;

proptest! {
    #[test]
    fn fitted_size_never_exceeds_target(
        src_w in 1..5000u32,
        src_h in 1..5000u32,
        target_w in 1..2000u32,
        target_h in 1..2000u32,
        scale_up in proptest::bool::ANY,
    ) {
        let (w, h) = fitting_size((src_w, src_h), (target_w, target_h), true, scale_up);
        prop_assert!(w <= target_w);
        prop_assert!(h <= target_h);
        prop_assert!(w >= 1 && h >= 1);
    }

    #[test]
    fn fitted_size_preserves_aspect_ratio(
        src_w in 1..5000u32,
        src_h in 1..5000u32,
        target_w in 1..2000u32,
        target_h in 1..2000u32,
    ) {
        let (w, h) = fitting_size((src_w, src_h), (target_w, target_h), true, true);
        // One axis matches the target exactly, the other is off by at
        // most the rounding of half a source pixel.
        let cross = (w as i64 * src_h as i64 - h as i64 * src_w as i64).unsigned_abs();
        prop_assert!(cross <= src_w.max(src_h) as u64);
    }

    #[test]
    fn without_scale_up_small_sources_pass_through(
        src_w in 1..500u32,
        src_h in 1..500u32,
    ) {
        let (w, h) = fitting_size((src_w, src_h), (500, 500), true, false);
        prop_assert_eq!((w, h), (src_w, src_h));
    }

    #[test]
    fn right_angles_always_parse(quarter_turns in -100..100i32) {
        prop_assert!(Rotation::from_degrees(quarter_turns * 90).is_ok());
    }

    #[test]
    fn oblique_angles_always_rejected(degrees in -10_000..10_000i32) {
        prop_assume!(degrees.rem_euclid(90) != 0);
        prop_assert!(Rotation::from_degrees(degrees).is_err());
    }

    #[test]
    fn four_quarter_turns_are_identity(start in 0..4i32) {
        let start = Rotation::from_degrees(start * 90).unwrap();
        let full = start
            .compose(Rotation::R90)
            .compose(Rotation::R90)
            .compose(Rotation::R90)
            .compose(Rotation::R90);
        prop_assert_eq!(full, start);
    }

    #[test]
    fn rendered_output_is_opaque_and_fits(
        src_w in 1..64u32,
        src_h in 1..64u32,
        alpha in proptest::num::u8::ANY,
    ) {
        let engine = ColorEngine::new();
        let buffer = ImageBuffer::from_decoded(DecodedImage {
            image: image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
                src_w,
                src_h,
                image::Rgba([90, 90, 90, alpha]),
            )),
            icc_profile: None,
            orientation: None,
        });
        let rendered =
            fit_in_rectangle(&engine, buffer, 32, 32, &FitOptions::default()).unwrap();
        prop_assert_eq!(rendered.format, PixelFormat::Rgb8);
        prop_assert!(rendered.width <= 32 && rendered.height <= 32);
        prop_assert_eq!(
            rendered.data.len(),
            rendered.width as usize * rendered.height as usize * 3
        );
    }
}
