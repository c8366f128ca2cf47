// 该文件是 Huoyan （火眼） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::warn;

use crate::model::{DetectItem, DetectResult};
use crate::output::OutputError;

const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const UNKNOWN_LABEL: &str = "unknown";
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

static FONT_DATA: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

/// 在画布上绘制检测框与标签，类别名称按索引解析
pub struct Draw {
  font: FontRef<'static>,
  font_size: f32,
  class_names: Vec<String>,
}

impl Draw {
  pub fn new(class_names: Vec<String>) -> Result<Self, OutputError> {
    let font = FontRef::try_from_slice(FONT_DATA)?;
    Ok(Self {
      font,
      font_size: LABEL_FONT_SIZE,
      class_names,
    })
  }

  /// `"<类别名> <置信度>"`，越界的类别索引显示为 `unknown`
  pub fn label(&self, item: &DetectItem) -> String {
    let name = match self.class_names.get(item.class_id) {
      Some(name) => name.as_str(),
      None => {
        warn!(
          "类别索引 {} 超出类别列表范围 ({})",
          item.class_id,
          self.class_names.len()
        );
        UNKNOWN_LABEL
      }
    };
    format!("{} {:.2}", name, item.score)
  }

  pub fn draw_detections(&self, image: &mut RgbImage, result: &DetectResult) {
    for item in result.iter() {
      self.draw_item(image, item);
    }
  }

  fn draw_item(&self, image: &mut RgbImage, item: &DetectItem) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    if w < 1.0 || h < 1.0 {
      return;
    }

    let x_min = ((item.bbox[0] * w).floor() as i32).clamp(0, w as i32 - 1);
    let y_min = ((item.bbox[1] * h).floor() as i32).clamp(0, h as i32 - 1);
    let x_max = ((item.bbox[2] * w).ceil() as i32).clamp(0, w as i32 - 1);
    let y_max = ((item.bbox[3] * h).ceil() as i32).clamp(0, h as i32 - 1);
    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = palette(item.class_id);
    for t in 0..BOX_THICKNESS {
      let width = x_max - x_min - 2 * t + 1;
      let height = y_max - y_min - 2 * t + 1;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let label = self.label(item);
    let scale = PxScale::from(self.font_size);
    let (text_w, text_h) = text_size(scale, &self.font, &label);
    let label_w = text_w + 2 * LABEL_PADDING as u32;
    let label_h = text_h + 2 * LABEL_PADDING as u32;

    // 标签放在框的上方，放不下时放在框内
    let label_y = if y_min >= label_h as i32 {
      y_min - label_h as i32
    } else {
      y_min
    };
    let rect = Rect::at(x_min, label_y).of_size(label_w, label_h);
    draw_filled_rect_mut(image, rect, color);
    draw_text_mut(
      image,
      TEXT_COLOR,
      x_min + LABEL_PADDING,
      label_y + LABEL_PADDING,
      scale,
      &self.font,
      &label,
    );
  }
}

/// 按类别索引在 HSV 色环上取色
pub fn palette(class_id: usize) -> Rgb<u8> {
  // 黄金角，使相邻类别颜色差异较大
  let hue = (class_id as f32 * 137.508) % 360.0;
  hsv_to_rgb(hue, 0.85, 0.95)
}

fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> Rgb<u8> {
  let c = value * saturation;
  let x = c * (1.0 - ((hue / 60.0) % 2.0 - 1.0).abs());
  let m = value - c;
  let (r, g, b) = match hue as u32 / 60 {
    0 => (c, x, 0.0),
    1 => (x, c, 0.0),
    2 => (0.0, c, x),
    3 => (0.0, x, c),
    4 => (x, 0.0, c),
    _ => (c, 0.0, x),
  };
  let to_u8 = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
  Rgb([to_u8(r), to_u8(g), to_u8(b)])
}

#[cfg(test)]
mod tests {
  use super::*;

  fn draw() -> Draw {
    Draw::new(vec!["person".to_string(), "car".to_string()]).unwrap()
  }

  fn item(class_id: usize, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score: 0.876,
      bbox,
    }
  }

  #[test]
  fn labels_resolve_class_names() {
    let draw = draw();
    assert_eq!(draw.label(&item(1, [0.0; 4])), "car 0.88");
    assert_eq!(draw.label(&item(7, [0.0; 4])), "unknown 0.88");
  }

  #[test]
  fn box_edges_use_the_class_colour() {
    let draw = draw();
    let mut image = RgbImage::new(100, 100);
    let result = DetectResult::from(vec![item(0, [0.2, 0.5, 0.8, 0.9])]);
    draw.draw_detections(&mut image, &result);

    let color = palette(0);
    assert_eq!(*image.get_pixel(50, 90), color);
    assert_eq!(*image.get_pixel(20, 70), color);
    assert_eq!(*image.get_pixel(21, 70), color);
    // 框内部不变
    assert_eq!(*image.get_pixel(50, 70), Rgb([0, 0, 0]));
  }

  #[test]
  fn out_of_range_class_does_not_panic() {
    let draw = draw();
    let mut image = RgbImage::new(8, 8);
    let result = DetectResult::from(vec![item(42, [0.0, 0.0, 1.0, 1.0])]);
    draw.draw_detections(&mut image, &result);
  }

  #[test]
  fn degenerate_boxes_are_skipped() {
    let draw = draw();
    let mut image = RgbImage::new(16, 16);
    let result = DetectResult::from(vec![item(0, [0.5, 0.5, 0.5, 0.5])]);
    draw.draw_detections(&mut image, &result);
    assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }

  #[test]
  fn palette_is_stable_and_varied() {
    assert_eq!(palette(3), palette(3));
    assert_ne!(palette(0), palette(1));
    assert_eq!(palette(0), hsv_to_rgb(0.0, 0.85, 0.95));
  }
}
