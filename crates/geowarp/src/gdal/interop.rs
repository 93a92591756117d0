use std::ffi::{CStr, CString, c_char, c_void};

use ::gdal::{cpl::CslStringList, spatial_ref::SpatialRef};
use gdal_sys::{GDALColorInterp, GDALDataType, GDALResampleAlg};

use crate::{DataType, Error, NameValueList, Result, SpatialReference, dataset::ColorInterpretation, warp::ResampleAlg};

pub const FALSE: i32 = 0;

/// Routes the GDAL diagnostics to the log facade, `debug` enables the GDAL debug messages
pub fn setup_logging(debug: bool) {
    if debug && ::gdal::config::set_config_option("CPL_DEBUG", "ON").is_err() {
        log::debug!("Failed to set GDAL debug level")
    }

    ::gdal::config::set_error_handler(|sev, _ec, msg| {
        use ::gdal::errors::CplErrType;
        match sev {
            CplErrType::Debug => log::debug!("GDAL: {msg}"),
            CplErrType::Warning => log::warn!("GDAL: {msg}"),
            CplErrType::Failure | CplErrType::Fatal => log::error!("GDAL: {msg}"),
            CplErrType::None => {}
        }
    });
}

fn raw_string_to_string(raw_ptr: *const c_char) -> String {
    if raw_ptr.is_null() {
        return String::new();
    }

    let c_str = unsafe { CStr::from_ptr(raw_ptr) };
    c_str.to_string_lossy().into_owned()
}

fn last_error_message() -> String {
    raw_string_to_string(unsafe { gdal_sys::CPLGetLastErrorMsg() })
}

pub fn check_rc(rc: gdal_sys::CPLErr::Type) -> Result {
    if rc == gdal_sys::CPLErr::CE_None {
        Ok(())
    } else {
        Err(Error::Runtime(format!("GDAL failure: {}", last_error_message())))
    }
}

pub fn check_pointer<T>(ptr: *mut T, method_name: &str) -> Result<*mut T> {
    if ptr.is_null() {
        let msg = last_error_message();
        unsafe { gdal_sys::CPLErrorReset() };
        Err(Error::Runtime(format!("{method_name} failed: {msg}")))
    } else {
        Ok(ptr)
    }
}

pub fn string(raw_ptr: *const c_char) -> String {
    raw_string_to_string(raw_ptr)
}

pub fn create_string_list(options: &NameValueList) -> Result<CslStringList> {
    let mut result = CslStringList::new();
    for (key, value) in options.iter() {
        result.set_name_value(key, value)?;
    }

    Ok(result)
}

/// `KEY=VALUE` items of a metadata domain, `None` selects the default domain
pub fn read_metadata(object: gdal_sys::GDALMajorObjectH, domain: Option<&str>) -> Result<NameValueList> {
    let domain = domain.map(CString::new).transpose()?;
    let list = unsafe { gdal_sys::GDALGetMetadata(object, domain.as_ref().map_or(std::ptr::null(), |d| d.as_ptr())) };

    let mut result = NameValueList::new();
    if list.is_null() {
        return Ok(result);
    }

    let mut index = 0;
    loop {
        let item = unsafe { *list.add(index) };
        if item.is_null() {
            break;
        }

        let item = raw_string_to_string(item);
        if let Some((key, value)) = item.split_once('=') {
            result.set(key, value);
        }
        index += 1;
    }

    Ok(result)
}

pub fn set_metadata_item(object: gdal_sys::GDALMajorObjectH, key: &str, value: &str) -> Result {
    let (key, value) = (CString::new(key)?, CString::new(value)?);
    check_rc(unsafe { gdal_sys::GDALSetMetadataItem(object, key.as_ptr(), value.as_ptr(), std::ptr::null()) })
}

pub fn set_description(object: gdal_sys::GDALMajorObjectH, description: &str) -> Result {
    let description = CString::new(description)?;
    unsafe { gdal_sys::GDALSetDescription(object, description.as_ptr()) };
    Ok(())
}

pub fn major_object<T>(handle: *mut T) -> gdal_sys::GDALMajorObjectH {
    handle.cast::<c_void>()
}

pub fn to_gdal_data_type(data_type: DataType) -> GDALDataType::Type {
    match data_type {
        DataType::Byte => GDALDataType::GDT_Byte,
        DataType::Int8 => GDALDataType::GDT_Int8,
        DataType::UInt16 => GDALDataType::GDT_UInt16,
        DataType::Int16 => GDALDataType::GDT_Int16,
        DataType::UInt32 => GDALDataType::GDT_UInt32,
        DataType::Int32 => GDALDataType::GDT_Int32,
        DataType::UInt64 => GDALDataType::GDT_UInt64,
        DataType::Int64 => GDALDataType::GDT_Int64,
        DataType::Float32 => GDALDataType::GDT_Float32,
        DataType::Float64 => GDALDataType::GDT_Float64,
        DataType::CInt16 => GDALDataType::GDT_CInt16,
        DataType::CInt32 => GDALDataType::GDT_CInt32,
        DataType::CFloat32 => GDALDataType::GDT_CFloat32,
        DataType::CFloat64 => GDALDataType::GDT_CFloat64,
    }
}

pub fn from_gdal_data_type(data_type: GDALDataType::Type) -> Result<DataType> {
    Ok(match data_type {
        GDALDataType::GDT_Byte => DataType::Byte,
        GDALDataType::GDT_Int8 => DataType::Int8,
        GDALDataType::GDT_UInt16 => DataType::UInt16,
        GDALDataType::GDT_Int16 => DataType::Int16,
        GDALDataType::GDT_UInt32 => DataType::UInt32,
        GDALDataType::GDT_Int32 => DataType::Int32,
        GDALDataType::GDT_UInt64 => DataType::UInt64,
        GDALDataType::GDT_Int64 => DataType::Int64,
        GDALDataType::GDT_Float32 => DataType::Float32,
        GDALDataType::GDT_Float64 => DataType::Float64,
        GDALDataType::GDT_CInt16 => DataType::CInt16,
        GDALDataType::GDT_CInt32 => DataType::CInt32,
        GDALDataType::GDT_CFloat32 => DataType::CFloat32,
        GDALDataType::GDT_CFloat64 => DataType::CFloat64,
        other => return Err(Error::Runtime(format!("Unsupported GDAL data type {other}"))),
    })
}

pub fn to_gdal_color_interpretation(interp: ColorInterpretation) -> GDALColorInterp::Type {
    match interp {
        ColorInterpretation::Undefined => GDALColorInterp::GCI_Undefined,
        ColorInterpretation::Gray => GDALColorInterp::GCI_GrayIndex,
        ColorInterpretation::Palette => GDALColorInterp::GCI_PaletteIndex,
        ColorInterpretation::Red => GDALColorInterp::GCI_RedBand,
        ColorInterpretation::Green => GDALColorInterp::GCI_GreenBand,
        ColorInterpretation::Blue => GDALColorInterp::GCI_BlueBand,
        ColorInterpretation::Alpha => GDALColorInterp::GCI_AlphaBand,
        ColorInterpretation::Hue => GDALColorInterp::GCI_HueBand,
        ColorInterpretation::Saturation => GDALColorInterp::GCI_SaturationBand,
        ColorInterpretation::Lightness => GDALColorInterp::GCI_LightnessBand,
        ColorInterpretation::Cyan => GDALColorInterp::GCI_CyanBand,
        ColorInterpretation::Magenta => GDALColorInterp::GCI_MagentaBand,
        ColorInterpretation::Yellow => GDALColorInterp::GCI_YellowBand,
        ColorInterpretation::Black => GDALColorInterp::GCI_BlackBand,
    }
}

pub fn from_gdal_color_interpretation(interp: GDALColorInterp::Type) -> ColorInterpretation {
    match interp {
        GDALColorInterp::GCI_GrayIndex => ColorInterpretation::Gray,
        GDALColorInterp::GCI_PaletteIndex => ColorInterpretation::Palette,
        GDALColorInterp::GCI_RedBand => ColorInterpretation::Red,
        GDALColorInterp::GCI_GreenBand => ColorInterpretation::Green,
        GDALColorInterp::GCI_BlueBand => ColorInterpretation::Blue,
        GDALColorInterp::GCI_AlphaBand => ColorInterpretation::Alpha,
        GDALColorInterp::GCI_HueBand => ColorInterpretation::Hue,
        GDALColorInterp::GCI_SaturationBand => ColorInterpretation::Saturation,
        GDALColorInterp::GCI_LightnessBand => ColorInterpretation::Lightness,
        GDALColorInterp::GCI_CyanBand => ColorInterpretation::Cyan,
        GDALColorInterp::GCI_MagentaBand => ColorInterpretation::Magenta,
        GDALColorInterp::GCI_YellowBand => ColorInterpretation::Yellow,
        GDALColorInterp::GCI_BlackBand => ColorInterpretation::Black,
        _ => ColorInterpretation::Undefined,
    }
}

pub fn to_gdal_resample_alg(resample: ResampleAlg) -> GDALResampleAlg::Type {
    match resample {
        ResampleAlg::NearestNeighbour => GDALResampleAlg::GRA_NearestNeighbour,
        ResampleAlg::Bilinear => GDALResampleAlg::GRA_Bilinear,
        ResampleAlg::Cubic => GDALResampleAlg::GRA_Cubic,
        ResampleAlg::CubicSpline => GDALResampleAlg::GRA_CubicSpline,
        ResampleAlg::Lanczos => GDALResampleAlg::GRA_Lanczos,
        ResampleAlg::Average => GDALResampleAlg::GRA_Average,
        ResampleAlg::Rms => GDALResampleAlg::GRA_RMS,
        ResampleAlg::Mode => GDALResampleAlg::GRA_Mode,
        ResampleAlg::Max => GDALResampleAlg::GRA_Max,
        ResampleAlg::Min => GDALResampleAlg::GRA_Min,
        ResampleAlg::Median => GDALResampleAlg::GRA_Med,
        ResampleAlg::Q1 => GDALResampleAlg::GRA_Q1,
        ResampleAlg::Q3 => GDALResampleAlg::GRA_Q3,
        ResampleAlg::Sum => GDALResampleAlg::GRA_Sum,
    }
}

/// EPSG code of a node of the spatial reference (`PROJCS`, `GEOGCS`, `VERT_CS`), the root node when `node` is `None`
fn epsg_code(srs: &SpatialRef, node: Option<&str>) -> Option<u32> {
    let node = node.map(CString::new).transpose().ok()?;
    let node_ptr = node.as_ref().map_or(std::ptr::null(), |n| n.as_ptr());

    let authority = string(unsafe { gdal_sys::OSRGetAuthorityName(srs.to_c_hsrs(), node_ptr) });
    if !authority.eq_ignore_ascii_case("EPSG") {
        return None;
    }

    string(unsafe { gdal_sys::OSRGetAuthorityCode(srs.to_c_hsrs(), node_ptr) }).parse().ok()
}

/// Converts a GDAL spatial reference, preferring the EPSG identification over the PROJ string
pub fn to_spatial_reference(srs: &SpatialRef) -> Result<SpatialReference> {
    if unsafe { gdal_sys::OSRIsCompound(srs.to_c_hsrs()) } != 0 {
        let horizontal = epsg_code(srs, Some("PROJCS")).or_else(|| epsg_code(srs, Some("GEOGCS")));
        if let (Some(horizontal), Some(vertical)) = (horizontal, epsg_code(srs, Some("VERT_CS"))) {
            match SpatialReference::compound(horizontal, vertical) {
                Ok(compound) => return Ok(compound),
                Err(err) => log::debug!("Compound spatial reference EPSG:{horizontal}+{vertical} not supported ({err})"),
            }
        }
    } else if let Some(srs) = epsg_code(srs, None).and_then(|code| SpatialReference::from_epsg(code).ok()) {
        return Ok(srs);
    }

    SpatialReference::from_proj_string(srs.to_proj4()?.trim())
}

pub fn to_gdal_spatial_ref(srs: &SpatialReference) -> Result<SpatialRef> {
    Ok(SpatialRef::from_definition(srs.definition())?)
}
