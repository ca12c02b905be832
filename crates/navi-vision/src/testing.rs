//! 테스트용 합성 이미지.

use image::{GrayImage, Luma};

fn hash(x: i64, y: i64, seed: u64) -> f32 {
    let mut h = (x as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
        ^ (y as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
        ^ seed.wrapping_mul(0x1656_67B1_9E37_79F9);
    h ^= h >> 33;
    h = h.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    h ^= h >> 33;
    (h >> 40) as f32 / (1u64 << 24) as f32
}

fn value_noise(x: f32, y: f32, cell: f32, seed: u64) -> f32 {
    let (fx, fy) = (x / cell, y / cell);
    let (ix, iy) = (fx.floor() as i64, fy.floor() as i64);
    let (tx, ty) = (fx - fx.floor(), fy - fy.floor());
    let (sx, sy) = (tx * tx * (3.0 - 2.0 * tx), ty * ty * (3.0 - 2.0 * ty));
    let a = hash(ix, iy, seed);
    let b = hash(ix + 1, iy, seed);
    let c = hash(ix, iy + 1, seed);
    let d = hash(ix + 1, iy + 1, seed);
    let top = a + (b - a) * sx;
    let bottom = c + (d - c) * sx;
    top + (bottom - top) * sy
}

/// 여러 스케일의 값 노이즈를 합친 지형 텍스처
pub fn textured_map(width: u32, height: u32, seed: u64) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let (fx, fy) = (x as f32, y as f32);
        let v = 20.0
            + 110.0 * value_noise(fx, fy, 16.0, seed)
            + 70.0 * value_noise(fx, fy, 8.0, seed + 1)
            + 50.0 * value_noise(fx, fy, 4.0, seed + 2);
        Luma([v.clamp(0.0, 255.0) as u8])
    })
}

/// 픽셀 단위 균일 노이즈
pub fn noise_image(width: u32, height: u32, seed: u64) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        Luma([(hash(x as i64, y as i64, seed) * 255.0) as u8])
    })
}

/// 어두운 배경 위 가우시안 밝은 점들
pub fn blob_image(width: u32, height: u32, centers: &[(u32, u32)]) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let mut v = 30.0f32;
        for &(cx, cy) in centers {
            let r2 = (x as f32 - cx as f32).powi(2) + (y as f32 - cy as f32).powi(2);
            v += 200.0 * (-r2 / 18.0).exp();
        }
        Luma([v.clamp(0.0, 255.0) as u8])
    })
}

pub fn crop(image: &GrayImage, x: u32, y: u32, width: u32, height: u32) -> GrayImage {
    image::imageops::crop_imm(image, x, y, width, height).to_image()
}
