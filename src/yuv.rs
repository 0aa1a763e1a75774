/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

//! Input buffer packing strategies for the codec's negotiated color layout.
//!
//! Hardware codecs accept raw frames either as three separate planes (I420)
//! or as a luma plane followed by interleaved chroma (NV12). The strategy is
//! selected once at configure time; per-frame packing never re-dispatches on
//! runtime type checks.

use crate::frame::I420Buffer;
use serde::{Deserialize, Serialize};

/// The raw input layout negotiated with the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum YuvFormat {
    /// Planar YUV 4:2:0: Y plane, then U plane, then V plane.
    I420,
    /// Semi-planar YUV 4:2:0: Y plane, then interleaved UV.
    Nv12,
}

/// Returns the row stride to use for packing. Codecs may report a stride
/// wider than the frame for alignment; a stride narrower than the frame
/// width is invalid and ignored.
pub fn effective_stride(reported_stride: usize, width: u32) -> usize {
    reported_stride.max(width as usize)
}

/// Returns the luma plane height to use for packing. A slice height smaller
/// than the frame height is invalid and ignored.
pub fn effective_slice_height(reported_slice_height: usize, height: u32) -> usize {
    reported_slice_height.max(height as usize)
}

impl YuvFormat {
    /// Input buffer size in bytes for the given layout and dimensions.
    /// `stride` and `slice_height` must already be effective values.
    pub fn buffer_size(&self, height: u32, stride: usize, slice_height: usize) -> usize {
        match self {
            YuvFormat::Nv12 => {
                let chroma_height = (height as usize + 1) / 2;
                slice_height * stride + chroma_height * stride
            }
            YuvFormat::I420 => {
                let chroma_stride = (stride + 1) / 2;
                let chroma_slice_height = (slice_height + 1) / 2;
                slice_height * stride + 2 * chroma_stride * chroma_slice_height
            }
        }
    }

    /// Pack `src` into `dst` using this layout. `dst` must be at least
    /// [`YuvFormat::buffer_size`] bytes; rows between the frame height and
    /// the slice height are left as padding.
    pub fn fill_buffer(&self, dst: &mut [u8], src: &I420Buffer, stride: usize, slice_height: usize) {
        let width = src.width() as usize;
        let height = src.height() as usize;
        let chroma_width = src.chroma_width();
        let chroma_height = src.chroma_height();

        // Luma plane is identical in both layouts.
        for row in 0..height {
            let dst_offset = row * stride;
            let src_offset = row * src.stride_y();
            dst[dst_offset..dst_offset + width]
                .copy_from_slice(&src.data_y()[src_offset..src_offset + width]);
        }

        match self {
            YuvFormat::I420 => {
                let chroma_stride = (stride + 1) / 2;
                let chroma_slice_height = (slice_height + 1) / 2;
                let u_base = stride * slice_height;
                let v_base = u_base + chroma_stride * chroma_slice_height;
                for row in 0..chroma_height {
                    let u_dst = u_base + row * chroma_stride;
                    let u_src = row * src.stride_u();
                    dst[u_dst..u_dst + chroma_width]
                        .copy_from_slice(&src.data_u()[u_src..u_src + chroma_width]);
                    let v_dst = v_base + row * chroma_stride;
                    let v_src = row * src.stride_v();
                    dst[v_dst..v_dst + chroma_width]
                        .copy_from_slice(&src.data_v()[v_src..v_src + chroma_width]);
                }
            }
            YuvFormat::Nv12 => {
                let uv_base = stride * slice_height;
                for row in 0..chroma_height {
                    let row_dst = uv_base + row * stride;
                    let u_src = row * src.stride_u();
                    let v_src = row * src.stride_v();
                    for col in 0..chroma_width {
                        dst[row_dst + 2 * col] = src.data_u()[u_src + col];
                        dst[row_dst + 2 * col + 1] = src.data_v()[v_src + col];
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIDTH: u32 = 640;
    const HEIGHT: u32 = 480;

    #[test]
    fn invalid_stride_ignored() {
        assert_eq!(effective_stride(WIDTH as usize / 2, WIDTH), WIDTH as usize);
        assert_eq!(
            effective_slice_height(HEIGHT as usize / 2, HEIGHT),
            HEIGHT as usize
        );
    }

    #[test]
    fn valid_stride_applied() {
        assert_eq!(effective_stride(WIDTH as usize * 2, WIDTH), WIDTH as usize * 2);
        assert_eq!(
            effective_slice_height(HEIGHT as usize * 2, HEIGHT),
            HEIGHT as usize * 2
        );
    }

    #[test]
    fn planar_buffer_size() {
        let w = WIDTH as usize;
        let h = HEIGHT as usize;
        assert_eq!(YuvFormat::I420.buffer_size(HEIGHT, w, h), w * h * 3 / 2);
        assert_eq!(
            YuvFormat::I420.buffer_size(HEIGHT, w * 2, h),
            w * 2 * h * 3 / 2
        );
        assert_eq!(
            YuvFormat::I420.buffer_size(HEIGHT, w, h * 2),
            w * h * 2 * 3 / 2
        );
    }

    #[test]
    fn semiplanar_buffer_size() {
        let w = WIDTH as usize;
        let h = HEIGHT as usize;
        assert_eq!(YuvFormat::Nv12.buffer_size(HEIGHT, w, h), w * h * 3 / 2);
        assert_eq!(
            YuvFormat::Nv12.buffer_size(HEIGHT, w * 2, h),
            w * 2 * h * 3 / 2
        );
        // Chroma rows follow the frame height, not the slice height.
        assert_eq!(
            YuvFormat::Nv12.buffer_size(HEIGHT, w, h * 2),
            w * h * 2 + w * h / 2
        );
    }

    fn patterned_buffer(width: u32, height: u32) -> I420Buffer {
        let mut buffer = I420Buffer::new(width, height);
        for (i, b) in buffer.data_y_mut().iter_mut().enumerate() {
            *b = i as u8;
        }
        for (i, b) in buffer.data_u_mut().iter_mut().enumerate() {
            *b = 0x40 + i as u8;
        }
        for (i, b) in buffer.data_v_mut().iter_mut().enumerate() {
            *b = 0x80 + i as u8;
        }
        buffer
    }

    #[test]
    fn fill_i420_tight() {
        let src = patterned_buffer(4, 4);
        let stride = 4;
        let slice_height = 4;
        let mut dst = vec![0u8; YuvFormat::I420.buffer_size(4, stride, slice_height)];
        YuvFormat::I420.fill_buffer(&mut dst, &src, stride, slice_height);

        // Tightly packed: the planes concatenate verbatim.
        let mut expected = Vec::new();
        expected.extend_from_slice(src.data_y());
        expected.extend_from_slice(src.data_u());
        expected.extend_from_slice(src.data_v());
        assert_eq!(dst, expected);
    }

    #[test]
    fn fill_i420_padded_stride() {
        let src = patterned_buffer(4, 2);
        let stride = 8;
        let slice_height = 2;
        let mut dst = vec![0xAA; YuvFormat::I420.buffer_size(2, stride, slice_height)];
        YuvFormat::I420.fill_buffer(&mut dst, &src, stride, slice_height);

        // First luma row lands at offset 0, second at the stride.
        assert_eq!(&dst[0..4], &src.data_y()[0..4]);
        assert_eq!(&dst[8..12], &src.data_y()[4..8]);
        // Chroma starts after the padded luma plane.
        let u_base = stride * slice_height;
        assert_eq!(&dst[u_base..u_base + 2], &src.data_u()[0..2]);
    }

    #[test]
    fn fill_nv12_interleaves_chroma() {
        let src = patterned_buffer(4, 4);
        let stride = 4;
        let slice_height = 4;
        let mut dst = vec![0u8; YuvFormat::Nv12.buffer_size(4, stride, slice_height)];
        YuvFormat::Nv12.fill_buffer(&mut dst, &src, stride, slice_height);

        assert_eq!(&dst[..16], src.data_y());
        let uv = &dst[16..];
        for row in 0..2 {
            for col in 0..2 {
                assert_eq!(uv[row * stride + 2 * col], src.data_u()[row * 2 + col]);
                assert_eq!(uv[row * stride + 2 * col + 1], src.data_v()[row * 2 + col]);
            }
        }
    }
}
