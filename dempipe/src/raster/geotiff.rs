//! Native single-band float GeoTIFF codec.
//!
//! Written files carry the pixel scale and tie point tags, a GeoKey
//! directory naming the projected CRS and a `GDAL_NODATA` tag, so GDAL-based
//! tools pick up georeferencing and NODATA without sidecar files.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::Array2;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

use super::{is_nodata, GeoTransform, Grid, RasterError, NODATA};
use crate::tile::ensure_parent;

/// Projected CRS of every product (Amersfoort / RD New).
pub const EPSG_CODE: u16 = 28992;

/// Writes `grid` as a 32-bit float GeoTIFF, creating parent folders.
pub fn write_geotiff(path: &Path, grid: &Grid) -> Result<(), RasterError> {
    ensure_parent(path)?;
    let tiff_err = |e: tiff::TiffError| RasterError::Tiff {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let file = BufWriter::new(File::create(path)?);
    let mut encoder = TiffEncoder::new(file).map_err(tiff_err)?;

    let data: Vec<f32> = grid
        .data
        .iter()
        .map(|&v| if is_nodata(v) { NODATA as f32 } else { v as f32 })
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(grid.cols() as u32, grid.rows() as u32)
        .map_err(tiff_err)?;

    let t = &grid.transform;
    let scale = [t.cell_size, t.cell_size, 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelPixelScaleTag, &scale[..])
        .map_err(tiff_err)?;

    let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
    image
        .encoder()
        .write_tag(Tag::ModelTiepointTag, &tiepoint[..])
        .map_err(tiff_err)?;

    // Version 1.1.0 with 3 keys: projected model, pixel-is-area, EPSG code
    let geokeys: [u16; 16] = [
        1, 1, 0, 3, //
        1024, 0, 1, 1, //
        1025, 0, 1, 1, //
        3072, 0, 1, EPSG_CODE,
    ];
    image
        .encoder()
        .write_tag(Tag::GeoKeyDirectoryTag, &geokeys[..])
        .map_err(tiff_err)?;

    let nodata = format!("{}", NODATA);
    image
        .encoder()
        .write_tag(Tag::GdalNodata, nodata.as_str())
        .map_err(tiff_err)?;

    image.write_data(&data).map_err(tiff_err)?;
    Ok(())
}

/// Reads a single-band GeoTIFF into a grid.
///
/// Cells equal to the file's NODATA value become [`NODATA`].
pub fn read_geotiff(path: &Path) -> Result<Grid, RasterError> {
    let tiff_err = |e: tiff::TiffError| RasterError::Tiff {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let file = BufReader::new(File::open(path)?);
    let mut decoder = Decoder::new(file)
        .map_err(tiff_err)?
        .with_limits(Limits::unlimited());
    let (width, height) = decoder.dimensions().map_err(tiff_err)?;
    let (rows, cols) = (height as usize, width as usize);

    let file_nodata = decoder
        .get_tag_ascii_string(Tag::GdalNodata)
        .ok()
        .and_then(|s| s.trim().trim_end_matches('\0').parse::<f64>().ok())
        .unwrap_or(NODATA);

    let values: Vec<f64> = match decoder.read_image().map_err(tiff_err)? {
        DecodingResult::F32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::F64(buf) => buf,
        DecodingResult::I16(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::I32(buf) => buf.into_iter().map(f64::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f64::from).collect(),
        _ => {
            return Err(RasterError::Tiff {
                path: path.to_path_buf(),
                reason: "unsupported pixel type".to_string(),
            })
        }
    };

    let values: Vec<f64> = values
        .into_iter()
        .map(|v| {
            if (v - file_nodata).abs() < 1e-6 || is_nodata(v) {
                NODATA
            } else {
                v
            }
        })
        .collect();

    let data = Array2::from_shape_vec((rows, cols), values).map_err(|e| RasterError::Tiff {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let scale = decoder
        .get_tag_f64_vec(Tag::ModelPixelScaleTag)
        .map_err(|_| RasterError::MissingTransform(path.to_path_buf()))?;
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::ModelTiepointTag)
        .map_err(|_| RasterError::MissingTransform(path.to_path_buf()))?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(RasterError::MissingTransform(path.to_path_buf()));
    }

    // tiepoint: [I, J, K, X, Y, Z]
    let transform = GeoTransform::new(
        tiepoint[3] - tiepoint[0] * scale[0],
        tiepoint[4] + tiepoint[1] * scale[1],
        scale[0],
    );

    Ok(Grid { transform, data })
}
