// 该文件是 Shanan （山南西风） 项目的一部分。
// src/asset.rs - 模型文件内存映射
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

use std::{
  fs::File,
  ops::Deref,
  path::{Path, PathBuf},
  sync::Arc,
};

use memmap2::{Mmap, MmapOptions};
use tracing::{debug, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, error::BridgeError};

/// 默认的模型文件名
pub const DEFAULT_MODEL_ASSET: &str = "model.tflite";

/// 模型文件中的一段区域；打包在更大容器中的模型以偏移和长度寻址
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AssetRegion {
  pub offset: u64,
  pub length: Option<usize>,
}

/// 模型资源的位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLocation {
  pub path: PathBuf,
  pub region: AssetRegion,
}

impl AssetLocation {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      path: path.into(),
      region: AssetRegion::default(),
    }
  }

  pub fn with_region(mut self, offset: u64, length: Option<usize>) -> Self {
    self.region = AssetRegion { offset, length };
    self
  }

  /// 只读映射模型文件
  pub fn open(&self) -> Result<ModelAsset, BridgeError> {
    ModelAsset::open_region(&self.path, self.region)
  }
}

impl FromUrlWithScheme for AssetLocation {
  const SCHEME: &'static str = "asset";
}

impl FromUrl for AssetLocation {
  type Error = BridgeError;

  /// `asset:///path/to/model.tflite?offset=128&length=4096`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(BridgeError::invalid_argument(format!(
        "model asset url must use the `{}` scheme, got `{}`",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let path = urlencoding::decode(url.path())
      .map_err(|e| BridgeError::invalid_argument(format!("bad asset path: {}", e)))?;

    let mut region = AssetRegion::default();
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "offset" => {
          region.offset = v
            .parse()
            .map_err(|_| BridgeError::invalid_argument(format!("bad asset offset: {}", v)))?;
        }
        "length" => {
          region.length = Some(
            v.parse()
              .map_err(|_| BridgeError::invalid_argument(format!("bad asset length: {}", v)))?,
          );
        }
        _ => {}
      }
    }

    Ok(AssetLocation {
      path: PathBuf::from(path.into_owned()),
      region,
    })
  }
}

/// 只读的模型文件映射，克隆开销很小，可以不加锁地共享
#[derive(Clone)]
pub struct ModelAsset {
  path: Arc<PathBuf>,
  map: Arc<Mmap>,
}

impl std::fmt::Debug for ModelAsset {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ModelAsset")
      .field("path", &self.path)
      .field("len", &self.map.len())
      .finish()
  }
}

impl ModelAsset {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
    Self::open_region(path, AssetRegion::default())
  }

  pub fn open_region(path: impl AsRef<Path>, region: AssetRegion) -> Result<Self, BridgeError> {
    let path = path.as_ref();
    info!("映射模型文件: {}", path.display());

    let file = File::open(path).map_err(|e| BridgeError::asset(path, e))?;
    let file_len = file.metadata().map_err(|e| BridgeError::asset(path, e))?.len();

    if region.offset > file_len {
      return Err(BridgeError::asset(
        path,
        std::io::Error::new(
          std::io::ErrorKind::UnexpectedEof,
          format!("offset {} beyond file size {}", region.offset, file_len),
        ),
      ));
    }

    let length = match region.length {
      Some(length) => {
        let end = region.offset.checked_add(length as u64);
        if end.is_none_or(|end| end > file_len) {
          return Err(BridgeError::asset(
            path,
            std::io::Error::new(
              std::io::ErrorKind::UnexpectedEof,
              format!(
                "region {}+{} beyond file size {}",
                region.offset, length, file_len
              ),
            ),
          ));
        }
        length
      }
      None => (file_len - region.offset) as usize,
    };

    if length == 0 {
      return Err(BridgeError::asset(
        path,
        std::io::Error::new(std::io::ErrorKind::InvalidData, "model file is empty"),
      ));
    }

    // SAFETY: 映射为只读；模型文件在进程生命周期内不应被外部改写
    let map = unsafe {
      MmapOptions::new()
        .offset(region.offset)
        .len(length)
        .map(&file)
    }
    .map_err(|e| BridgeError::asset(path, e))?;

    debug!(
      "模型文件大小: {:.2} MB",
      map.len() as f64 / (1024.0 * 1024.0)
    );

    Ok(ModelAsset {
      path: Arc::new(path.to_path_buf()),
      map: Arc::new(map),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Deref for ModelAsset {
  type Target = [u8];

  fn deref(&self) -> &Self::Target {
    &self.map
  }
}

impl AsRef<[u8]> for ModelAsset {
  fn as_ref(&self) -> &[u8] {
    &self.map
  }
}
