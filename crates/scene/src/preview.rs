use std::borrow::Cow;

use foundation::{DepthBuffer, DepthSamples};

/// Pixels to restore under the overlay.
///
/// Image responses keep their own decoded RGBA bytes (colour map, colour bar
/// and all). Bare depth arrays fall back to [`grayscale_rgba`].
pub fn base_rgba(buffer: &DepthBuffer) -> Cow<'_, [u8]> {
    match buffer.samples() {
        DepthSamples::Rgba8 { data, .. } => Cow::Borrowed(data.as_slice()),
        _ => Cow::Owned(grayscale_rgba(buffer)),
    }
}

/// Opaque grayscale RGBA pixels for showing `buffer` as an image.
///
/// Depth is stretched over its finite bounds; non-finite samples are black.
pub fn grayscale_rgba(buffer: &DepthBuffer) -> Vec<u8> {
    let (min, max) = buffer.depth_bounds().unwrap_or((0.0, 0.0));
    let span = max - min;
    let mut out = Vec::with_capacity(buffer.len() * 4);
    for d in buffer.depths() {
        let v = if !d.is_finite() {
            0
        } else if span > 0.0 {
            (((d - min) / span) * 255.0).round() as u8
        } else {
            128
        };
        out.extend_from_slice(&[v, v, v, 255]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundation::Channel;
    use pretty_assertions::assert_eq;

    #[test]
    fn image_responses_keep_their_decoded_pixels() {
        let data = vec![200, 10, 30, 255, 0, 90, 250, 128];
        let buffer = DepthBuffer::new(
            2,
            1,
            DepthSamples::Rgba8 {
                data: data.clone(),
                channel: Channel::Red,
            },
        )
        .unwrap();
        assert_eq!(base_rgba(&buffer).as_ref(), data.as_slice());
    }

    #[test]
    fn depth_arrays_fall_back_to_grayscale() {
        let buffer = DepthBuffer::new(2, 1, DepthSamples::Float32(vec![0.0, 1.0])).unwrap();
        assert_eq!(
            base_rgba(&buffer).into_owned(),
            vec![0, 0, 0, 255, 255, 255, 255, 255]
        );
    }

    #[test]
    fn stretches_over_depth_bounds() {
        let buffer =
            DepthBuffer::new(3, 1, DepthSamples::Float32(vec![2.0, 4.0, f32::NAN])).unwrap();
        assert_eq!(
            grayscale_rgba(&buffer),
            vec![0, 0, 0, 255, 255, 255, 255, 255, 0, 0, 0, 255]
        );
    }

    #[test]
    fn flat_buffer_is_mid_gray() {
        let buffer = DepthBuffer::new(1, 1, DepthSamples::Float32(vec![7.0])).unwrap();
        assert_eq!(grayscale_rgba(&buffer), vec![128, 128, 128, 255]);
    }
}
