use approx::assert_abs_diff_eq;
use ndarray::Array2;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tilechron::core::indices::{IndexDefinition, SpectralIndexEngine};
use tilechron::types::{GeoTransform, Georeference};
use tilechron::{GdalRasterIo, Mission, RasterIo, SceneDescriptor, TimeSeries};

const UTM_32N: &str = r#"PROJCS["WGS 84 / UTM zone 32N",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563]],PRIMEM["Greenwich",0],UNIT["degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["latitude_of_origin",0],PARAMETER["central_meridian",9],PARAMETER["scale_factor",0.9996],PARAMETER["false_easting",500000],PARAMETER["false_northing",0],UNIT["metre",1],AUTHORITY["EPSG","32632"]]"#;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn georef() -> Georeference {
    Georeference {
        geo_transform: GeoTransform::from_gdal([600000.0, 30.0, 0.0, 5100000.0, 0.0, -30.0]),
        projection: UTM_32N.to_string(),
    }
}

fn write_band(io: &GdalRasterIo, path: &Path, data: Array2<f32>) {
    io.write_f32_bands(path, &[data], &georef()).unwrap();
}

#[test]
fn test_geotiff_round_trip() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let io = GdalRasterIo::new();
    let path = temp.path().join("stack.tif");

    let a = Array2::from_shape_fn((6, 8), |(r, c)| (r * 8 + c) as f32 * 0.5);
    let b = Array2::from_elem((6, 8), -0.25f32);
    io.write_f32_bands(&path, &[a.clone(), b.clone()], &georef()).unwrap();

    assert_eq!(io.raster_size(&path).unwrap(), (8, 6));
    assert_eq!(io.read_f32(&path, 1).unwrap(), a);
    assert_eq!(io.read_f32(&path, 2).unwrap(), b);

    let window = io.read_f32_window(&path, 1, (2, 1), (3, 2)).unwrap();
    assert_eq!(window.dim(), (2, 3));
    assert_eq!(window[[0, 0]], a[[1, 2]]);

    let read = io.georeference(&path).unwrap();
    assert_eq!(read.geo_transform, georef().geo_transform);
    assert!(read.projection.contains("32632"));

    assert!(io.read_f32(&temp.path().join("missing.tif"), 1).is_err());
}

#[test]
fn test_scene_from_geotiffs() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let product = "LC08_L2SP_190028_20220615_20220627_02_T1";
    let dir = temp.path().join("data").join(product);
    std::fs::create_dir_all(&dir).unwrap();
    let scratch = temp.path().join("scratch");
    let output = temp.path().join("out");

    let gdal_io = GdalRasterIo::new();
    for (band, value) in [("SR_B2", 100.0f32), ("SR_B4", 200.0), ("SR_B5", 600.0), ("SR_B6", 300.0), ("SR_B7", 100.0)] {
        write_band(&gdal_io, &dir.join(format!("{}_{}.TIF", product, band)), Array2::from_elem((5, 5), value));
    }
    let qa = Array2::from_shape_fn((5, 5), |(r, _)| if r == 0 { 1.0f32 } else { 21824.0 });
    write_band(&gdal_io, &dir.join(format!("{}_QA_PIXEL.TIF", product)), qa);

    let io: Arc<dyn RasterIo> = Arc::new(gdal_io);
    let scene = SceneDescriptor::from_scene_dir(Mission::Landsat, &dir, &scratch, None, io.clone()).unwrap();
    assert_eq!(scene.no_data_pixel_count().unwrap(), 5);
    assert_eq!(scene.total_pixel_count().unwrap(), 25);

    let mut ts = TimeSeries::new(Mission::Landsat, &scratch);
    ts.append(scene).unwrap();

    let engine = SpectralIndexEngine::new(vec![IndexDefinition::ndvi()], "NDVI");
    let report = engine.compute(&ts, &output, None).unwrap();
    assert_eq!(report.written, vec![output.join("190028_20220615_NDVI.tif")]);

    let ndvi = io.read_f32(&report.written[0], 1).unwrap();
    assert_abs_diff_eq!(ndvi[[2, 2]], 0.5, epsilon = 1e-6);
    assert_eq!(io.georeference(&report.written[0]).unwrap().geo_transform, georef().geo_transform);
}
