// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{ImageReader, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  descriptor::{ElementType, InputSpec},
  tensor::InputTensor,
};

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("Bad query parameter `{0}`: {1}")]
  QueryError(String, String),
  #[error("Bad path encoding: {0}")]
  PathError(std::string::FromUtf8Error),
  #[error("I/O error: {0}")]
  IoError(std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(image::ImageError),
}

impl From<std::io::Error> for ImageFileInputError {
  fn from(err: std::io::Error) -> Self {
    ImageFileInputError::IoError(err)
  }
}

impl From<image::ImageError> for ImageFileInputError {
  fn from(err: image::ImageError) -> Self {
    ImageFileInputError::ImageLoadError(err)
  }
}

/// 读取图像并转换为 NHWC 输入张量
///
/// `image:///path/to/a.png?width=640&height=640&element=float32`
/// 尺寸和元素类型可以写在 URL 中，也可以由 [`ImageFileInput::conform`] 从模型输入
/// 描述中取得；URL 中的值优先。`width` 与 `height` 必须同时给出。
/// 浮点输入归一化到 [0, 1]，`uint8` 输入保持原始像素值。
pub struct ImageFileInput {
  image: Option<RgbImage>,
  size: Option<(u32, u32)>,
  element: Option<ElementType>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

fn parse_query<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ImageFileInputError> {
  value
    .parse()
    .map_err(|_| ImageFileInputError::QueryError(key.to_string(), value.to_string()))
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let mut width: Option<u32> = None;
    let mut height: Option<u32> = None;
    let mut element = None;
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "width" => width = Some(parse_query(&k, &v)?),
        "height" => height = Some(parse_query(&k, &v)?),
        "element" => {
          element = Some(match v.as_ref() {
            "float32" => ElementType::Float32,
            "uint8" => ElementType::UInt8,
            _ => return Err(ImageFileInputError::QueryError(k.to_string(), v.to_string())),
          })
        }
        _ => {}
      }
    }

    let size = match (width, height) {
      (Some(w), Some(h)) => Some((w, h)),
      (None, None) => None,
      (Some(w), None) => {
        return Err(ImageFileInputError::QueryError(
          "width".to_string(),
          format!("{} given without height", w),
        ));
      }
      (None, Some(h)) => {
        return Err(ImageFileInputError::QueryError(
          "height".to_string(),
          format!("{} given without width", h),
        ));
      }
    };

    let path = urlencoding::decode(url.path()).map_err(ImageFileInputError::PathError)?;
    let image: RgbImage = ImageReader::open(path.as_ref())?.decode()?.into();

    Ok(ImageFileInput {
      image: Some(image),
      size,
      element,
    })
  }
}

impl ImageFileInput {
  /// 用模型输入描述补全 URL 中未给出的尺寸和元素类型
  ///
  /// 形状按 NHWC 解释：`[1, H, W, 3]` 或 `[H, W, 3]`，其他形状不提供尺寸。
  pub fn conform(&mut self, spec: &InputSpec) {
    if self.size.is_none() {
      self.size = spec.shape.as_deref().and_then(nhwc_size);
    }
    if self.element.is_none() {
      self.element = Some(spec.element);
    }
  }
}

fn nhwc_size(shape: &[usize]) -> Option<(u32, u32)> {
  let (h, w) = match shape {
    [1, h, w, RGB_CHANNELS] | [h, w, RGB_CHANNELS] => (*h, *w),
    _ => return None,
  };
  Some((u32::try_from(w).ok()?, u32::try_from(h).ok()?))
}

/// 按 NHWC 顺序排列像素
pub fn nhwc_tensor(image: &RgbImage, element: ElementType) -> InputTensor {
  let (width, height) = image.dimensions();
  let count = width as usize * height as usize * RGB_CHANNELS;

  match element {
    ElementType::UInt8 => InputTensor::from(image.as_raw().clone()),
    ElementType::Float32 => {
      let mut values = Vec::with_capacity(count);
      for pixel in image.pixels() {
        for c in 0..RGB_CHANNELS {
          values.push(pixel[c] as f32 / 255.0);
        }
      }
      InputTensor::from_f32(&values)
    }
  }
}

impl Iterator for ImageFileInput {
  type Item = InputTensor;

  fn next(&mut self) -> Option<Self::Item> {
    let image = self.image.take()?;
    let image = match self.size {
      Some((w, h)) if (w, h) != image.dimensions() => {
        debug!("缩放图像 {:?} -> {}x{}", image.dimensions(), w, h);
        image::imageops::resize(&image, w, h, FilterType::Triangle)
      }
      _ => image,
    };
    Some(nhwc_tensor(&image, self.element.unwrap_or_default()))
  }
}

#[cfg(test)]
mod tests {
  use image::Rgb;

  use super::*;
  use crate::tensor::decode_native_f32;

  #[test]
  fn uint8_tensor_is_interleaved_rgb() {
    let mut image = RgbImage::new(2, 1);
    image.put_pixel(0, 0, Rgb([1, 2, 3]));
    image.put_pixel(1, 0, Rgb([4, 5, 6]));
    let tensor = nhwc_tensor(&image, ElementType::UInt8);
    assert_eq!(tensor.as_bytes(), &[1, 2, 3, 4, 5, 6]);
  }

  #[test]
  fn float_tensor_is_normalized() {
    let mut image = RgbImage::new(1, 1);
    image.put_pixel(0, 0, Rgb([0, 255, 51]));
    let tensor = nhwc_tensor(&image, ElementType::Float32);
    assert_eq!(decode_native_f32(tensor.as_bytes()), vec![0.0, 1.0, 0.2]);
  }

  #[test]
  fn reads_and_resizes_png() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.png");
    RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]))
      .save(&path)
      .unwrap();

    let url = Url::parse(&format!(
      "image://{}?width=2&height=2&element=uint8",
      path.display()
    ))
    .unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();
    let tensor = input.next().unwrap();
    assert_eq!(tensor.len(), 2 * 2 * 3);
    assert!(input.next().is_none());
  }

  fn png(dir: &tempfile::TempDir, width: u32, height: u32) -> std::path::PathBuf {
    let path = dir.path().join("input.png");
    RgbImage::from_pixel(width, height, Rgb([10, 20, 30]))
      .save(&path)
      .unwrap();
    path
  }

  #[test]
  fn lone_width_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = png(&dir, 4, 4);
    for query in ["width=2", "height=2"] {
      let url = Url::parse(&format!("image://{}?{}", path.display(), query)).unwrap();
      assert!(matches!(
        ImageFileInput::from_url(&url),
        Err(ImageFileInputError::QueryError(_, _))
      ));
    }
  }

  #[test]
  fn conforms_to_descriptor_input_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = png(&dir, 4, 4);
    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();
    input.conform(&InputSpec {
      shape: Some(vec![1, 3, 2, 3]),
      element: ElementType::UInt8,
      ..InputSpec::default()
    });

    let tensor = input.next().unwrap();
    assert_eq!(tensor.len(), 3 * 2 * 3);
  }

  #[test]
  fn url_query_takes_priority_over_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let path = png(&dir, 4, 4);
    let url = Url::parse(&format!(
      "image://{}?width=1&height=1&element=float32",
      path.display()
    ))
    .unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();
    input.conform(&InputSpec {
      shape: Some(vec![1, 3, 2, 3]),
      element: ElementType::UInt8,
      ..InputSpec::default()
    });

    let tensor = input.next().unwrap();
    assert_eq!(tensor.len(), 3 * 4);
  }

  #[test]
  fn non_nhwc_shape_keeps_image_size() {
    assert_eq!(nhwc_size(&[1, 3, 8, 8]), None);
    assert_eq!(nhwc_size(&[1, 8, 6, 3]), Some((6, 8)));
    assert_eq!(nhwc_size(&[8, 6, 3]), Some((6, 8)));
  }
}
