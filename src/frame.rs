// 该文件是 Linghe （凌河） 项目的一部分。
// src/frame.rs - 平面帧与 letterbox 缩放
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Linghe 开发者

use image::{DynamicImage, imageops::FilterType};
use tracing::debug;

use crate::model::{BBox, DetectorError};

/// letterbox 填充值（归一化灰度）
pub const LETTERBOX_FILL: f32 = 0.5;

/// NCHW 排布的浮点帧，像素值归一化到 [0, 1]
#[derive(Debug, Clone)]
pub struct PlanarFrame {
  width: u32,
  height: u32,
  channels: u32,
  data: Box<[f32]>,
}

impl PlanarFrame {
  /// 分配一个填充为 `value` 的帧，尺寸溢出或内存不足时返回错误
  pub fn try_filled(
    width: u32,
    height: u32,
    channels: u32,
    value: f32,
  ) -> Result<Self, DetectorError> {
    let len = (width as usize)
      .checked_mul(height as usize)
      .and_then(|n| n.checked_mul(channels as usize))
      .ok_or_else(|| {
        DetectorError::ResourceExhausted(format!(
          "帧尺寸溢出: {}x{}x{}",
          width, height, channels
        ))
      })?;

    let mut data = Vec::new();
    data
      .try_reserve_exact(len)
      .map_err(|e| DetectorError::ResourceExhausted(format!("无法分配 {} 个元素: {}", len, e)))?;
    data.resize(len, value);

    Ok(Self {
      width,
      height,
      channels,
      data: data.into_boxed_slice(),
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> u32 {
    self.channels
  }

  /// 张量形状 `[1, C, H, W]`
  pub fn shape(&self) -> [usize; 4] {
    [
      1,
      self.channels as usize,
      self.height as usize,
      self.width as usize,
    ]
  }

  pub fn as_nchw(&self) -> &[f32] {
    &self.data
  }

  pub fn get(&self, c: u32, y: u32, x: u32) -> Option<f32> {
    if c >= self.channels || y >= self.height || x >= self.width {
      return None;
    }
    let plane = self.width as usize * self.height as usize;
    let idx = c as usize * plane + y as usize * self.width as usize + x as usize;
    self.data.get(idx).copied()
  }

  // 将 interleaved 像素写入 (dx, dy) 起始的区域，越界部分丢弃
  fn embed(&mut self, pixels: &[f32], width: u32, height: u32, dx: u32, dy: u32) {
    let channels = self.channels as usize;
    let plane = self.width as usize * self.height as usize;

    for y in 0..height {
      let ty = y + dy;
      if ty >= self.height {
        break;
      }
      for x in 0..width {
        let tx = x + dx;
        if tx >= self.width {
          break;
        }
        let src = (y as usize * width as usize + x as usize) * channels;
        let dst = ty as usize * self.width as usize + tx as usize;
        for c in 0..channels {
          self.data[c * plane + dst] = pixels[src + c];
        }
      }
    }
  }
}

/// letterbox 缩放参数，用于把网络坐标还原到原图
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LetterboxTransform {
  pub orig_width: u32,
  pub orig_height: u32,
  pub input_width: u32,
  pub input_height: u32,
  pub new_width: u32,
  pub new_height: u32,
}

impl LetterboxTransform {
  pub fn new(
    orig_width: u32,
    orig_height: u32,
    input_width: u32,
    input_height: u32,
  ) -> Result<Self, DetectorError> {
    if orig_width == 0 || orig_height == 0 {
      return Err(DetectorError::ShapeMismatch(format!(
        "输入图像尺寸无效: {}x{}",
        orig_width, orig_height
      )));
    }
    if input_width == 0 || input_height == 0 {
      return Err(DetectorError::ShapeMismatch(format!(
        "模型输入尺寸无效: {}x{}",
        input_width, input_height
      )));
    }

    // 整数运算与缩放后图像尺寸保持一致
    let (new_width, new_height) = if (input_width as f32 / orig_width as f32)
      < (input_height as f32 / orig_height as f32)
    {
      let h = (orig_height as u64 * input_width as u64) / orig_width as u64;
      (input_width, (h as u32).max(1))
    } else {
      let w = (orig_width as u64 * input_height as u64) / orig_height as u64;
      ((w as u32).max(1), input_height)
    };

    Ok(Self {
      orig_width,
      orig_height,
      input_width,
      input_height,
      new_width,
      new_height,
    })
  }

  pub fn offset_x(&self) -> u32 {
    (self.input_width - self.new_width) / 2
  }

  pub fn offset_y(&self) -> u32 {
    (self.input_height - self.new_height) / 2
  }

  /// 将相对网络输入归一化的中心框还原为相对原图归一化的中心框
  pub fn restore(&self, bbox: BBox) -> BBox {
    let net_w = self.input_width as f32;
    let net_h = self.input_height as f32;
    let new_w = self.new_width as f32;
    let new_h = self.new_height as f32;

    BBox {
      x: (bbox.x - (net_w - new_w) / 2.0 / net_w) / (new_w / net_w),
      y: (bbox.y - (net_h - new_h) / 2.0 / net_h) / (new_h / net_h),
      w: bbox.w * net_w / new_w,
      h: bbox.h * net_h / new_h,
    }
  }
}

/// letterbox 后的帧，仅在一次推理中存活
#[derive(Debug)]
pub struct LetterboxFrame {
  pub frame: PlanarFrame,
  pub transform: LetterboxTransform,
}

/// 保持宽高比缩放到 `width x height`，居中放置并以灰色填充其余区域
pub fn letterbox(
  image: &DynamicImage,
  width: u32,
  height: u32,
  channels: u32,
) -> Result<LetterboxFrame, DetectorError> {
  let transform = LetterboxTransform::new(image.width(), image.height(), width, height)?;
  debug!(
    "letterbox: {}x{} -> {}x{} (输入 {}x{})",
    transform.orig_width,
    transform.orig_height,
    transform.new_width,
    transform.new_height,
    width,
    height
  );

  let resized = image.resize_exact(
    transform.new_width,
    transform.new_height,
    FilterType::Triangle,
  );

  let mut frame = PlanarFrame::try_filled(width, height, channels, LETTERBOX_FILL)?;
  let (dx, dy) = (transform.offset_x(), transform.offset_y());
  match channels {
    1 => frame.embed(&resized.to_luma32f(), resized.width(), resized.height(), dx, dy),
    3 => frame.embed(&resized.to_rgb32f(), resized.width(), resized.height(), dx, dy),
    4 => frame.embed(&resized.to_rgba32f(), resized.width(), resized.height(), dx, dy),
    other => {
      return Err(DetectorError::ShapeMismatch(format!(
        "不支持的输入通道数: {}",
        other
      )));
    }
  }

  Ok(LetterboxFrame { frame, transform })
}
