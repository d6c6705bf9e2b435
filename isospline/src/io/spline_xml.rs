//! Reading and writing spline model documents.
//!
//! Precursor models:
//!
//! ```xml
//! <models maxIsotope="20" maxSulfur="10">
//!   <model isotope="0" S="3" order="4">
//!     <knots endian="little" precision="64" length="n">...base64...</knots>
//!     <coefficients endian="little" precision="64" length="(n - 1) * 4">...base64...</coefficients>
//!   </model>
//! </models>
//! ```
//!
//! Fragment models use a `fragmentModels` root whose `model` elements carry
//! `precursorIsotope`, `fragmentIsotope` and optional `S`, `compS`, `Se`, `compSe`
//! attributes, with `precursorBreaks`, `fragmentBreaks` and `coefficients` arrays.

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use tracing::{info, instrument, warn};

use crate::algorithm::cubic_spline::CubicSpline;
use crate::algorithm::tensor_spline::TensorProductSpline;
use crate::chemistry::constants::CUBIC_SPLINE_ORDER;
use crate::error::{IsotopeSplineError, Result};
use crate::io::binary_array::{
    decode_binary_array, encode_binary_array, BinaryArrayLayout, Endianness, Precision,
};
use crate::model::collection::ModelCollection;
use crate::model::fragment::FragmentModelSet;
use crate::model::key::{FragmentModelKey, ModelKey};

/// load precursor isotope models from a document on disk
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_models_from_path(path: impl AsRef<Path>) -> Result<ModelCollection> {
    let path = path.as_ref();
    let xml = std::fs::read_to_string(path).map_err(|e| IsotopeSplineError::io(path, &e))?;
    let collection = load_models_from_str(&xml)?;
    info!(
        "Loaded {} spline models from {} (max isotope {}, max sulfur {})",
        collection.len(),
        path.display(),
        collection.max_isotope(),
        collection.max_sulfur()
    );
    Ok(collection)
}

/// load precursor isotope models from document text
pub fn load_models_from_str(xml: &str) -> Result<ModelCollection> {
    let mut handler = PrecursorDocument::default();
    parse_document(xml, &mut handler)?;
    handler.finish()
}

/// load tensor-product fragment models from a document on disk
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_fragment_models_from_path(path: impl AsRef<Path>) -> Result<FragmentModelSet> {
    let path = path.as_ref();
    let xml = std::fs::read_to_string(path).map_err(|e| IsotopeSplineError::io(path, &e))?;
    let set = load_fragment_models_from_str(&xml)?;
    info!(
        "Loaded {} fragment models from {} (max isotope {})",
        set.models.len(),
        path.display(),
        set.max_isotope
    );
    Ok(set)
}

/// load tensor-product fragment models from document text
pub fn load_fragment_models_from_str(xml: &str) -> Result<FragmentModelSet> {
    let mut handler = FragmentDocument::default();
    parse_document(xml, &mut handler)?;
    handler.finish()
}

/// split a flat coefficient stream into per-segment `(a, b, c, d)` arrays
///
/// Arguments:
///
/// * `flat` - coefficients, one block of `order` values per segment, lowest power first
/// * `order` - spline order, 4 for cubic splines
///
/// Returns:
///
/// * `Result<(Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>)>` - cubic, quadratic, linear and constant coefficients
///
pub fn regroup_coefficients(flat: &[f64], order: u32) -> Result<(Vec<f64>, Vec<f64>, Vec<f64>, Vec<f64>)> {
    if order != CUBIC_SPLINE_ORDER {
        return Err(IsotopeSplineError::UnsupportedOrder(order));
    }

    let order = order as usize;
    if flat.len() % order != 0 {
        return Err(IsotopeSplineError::LengthMismatch {
            element: "coefficients".to_string(),
            expected: (flat.len() / order + 1) * order,
            found: flat.len(),
        });
    }

    let segments = flat.len() / order;
    let (mut a, mut b, mut c, mut d) = (
        Vec::with_capacity(segments),
        Vec::with_capacity(segments),
        Vec::with_capacity(segments),
        Vec::with_capacity(segments),
    );
    for block in flat.chunks_exact(order) {
        d.push(block[0]);
        c.push(block[1]);
        b.push(block[2]);
        a.push(block[3]);
    }

    Ok((a, b, c, d))
}

/// write precursor isotope models as a document readable by [`load_models_from_str`]
pub fn write_models_to_string(collection: &ModelCollection) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("models");
    root.push_attribute(("maxIsotope", collection.max_isotope().to_string().as_str()));
    root.push_attribute(("maxSulfur", collection.max_sulfur().to_string().as_str()));
    write(&mut writer, Event::Start(root))?;

    for (key, spline) in collection.iter() {
        let mut model = BytesStart::new("model");
        model.push_attribute(("isotope", key.isotope.to_string().as_str()));
        if let Some(num_sulfur) = key.num_sulfur {
            model.push_attribute(("S", num_sulfur.to_string().as_str()));
        }
        model.push_attribute(("order", CUBIC_SPLINE_ORDER.to_string().as_str()));
        write(&mut writer, Event::Start(model))?;

        let coefficients: Vec<f64> = (0..spline.num_segments())
            .flat_map(|i| spline.segment_coefficients(i))
            .collect();
        write_array(&mut writer, "knots", spline.knots())?;
        write_array(&mut writer, "coefficients", &coefficients)?;

        write(&mut writer, Event::End(BytesEnd::new("model")))?;
    }

    write(&mut writer, Event::End(BytesEnd::new("models")))?;

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| IsotopeSplineError::Serialization(e.to_string()))
}

fn write_array(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str, values: &[f64]) -> Result<()> {
    let mut element = BytesStart::new(name);
    element.push_attribute(("endian", Endianness::Little.as_str()));
    element.push_attribute(("precision", "64"));
    element.push_attribute(("length", values.len().to_string().as_str()));
    write(writer, Event::Start(element))?;
    let payload = encode_binary_array(values, Endianness::Little);
    write(writer, Event::Text(BytesText::new(&payload)))?;
    write(writer, Event::End(BytesEnd::new(name)))
}

fn write(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| IsotopeSplineError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// document driver
// ---------------------------------------------------------------------------

trait DocumentHandler {
    fn start(&mut self, name: &str, attributes: Attributes, position: usize) -> Result<()>;
    fn text(&mut self, text: &str);
    fn end(&mut self, name: &str, position: usize) -> Result<()>;
}

fn parse_document<H: DocumentHandler>(xml: &str, handler: &mut H) -> Result<()> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        let position = reader.buffer_position();
        match reader.read_event() {
            Err(e) => return Err(IsotopeSplineError::parse(position, e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                let name = element_name(&e);
                handler.start(&name, Attributes::read(&e, position)?, position)?;
            }
            Ok(Event::Empty(e)) => {
                let name = element_name(&e);
                handler.start(&name, Attributes::read(&e, position)?, position)?;
                handler.end(&name, position)?;
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| IsotopeSplineError::parse(position, e.to_string()))?;
                handler.text(&text);
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                handler.end(&name, position)?;
            }
            Ok(_) => {}
        }
    }

    Ok(())
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

struct Attributes {
    values: HashMap<String, String>,
    position: usize,
}

impl Attributes {
    fn read(e: &BytesStart<'_>, position: usize) -> Result<Self> {
        let mut values = HashMap::new();
        for attribute in e.attributes() {
            let attribute = attribute.map_err(|err| IsotopeSplineError::parse(position, err.to_string()))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute
                .unescape_value()
                .map_err(|err| IsotopeSplineError::parse(position, err.to_string()))?
                .into_owned();
            values.insert(key, value);
        }
        Ok(Attributes { values, position })
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| IsotopeSplineError::parse(self.position, format!("missing attribute '{}'", name)))
    }

    fn optional_u32(&self, name: &str) -> Result<Option<u32>> {
        match self.values.get(name) {
            Some(value) => self.parse_u32(name, value).map(Some),
            None => Ok(None),
        }
    }

    fn required_u32(&self, name: &str) -> Result<u32> {
        let value = self.required(name)?;
        self.parse_u32(name, value)
    }

    fn parse_u32(&self, name: &str, value: &str) -> Result<u32> {
        value.trim().parse::<u32>().map_err(|_| {
            IsotopeSplineError::parse(
                self.position,
                format!("attribute '{}' is not a non-negative integer: '{}'", name, value),
            )
        })
    }

    fn array_layout(&self) -> Result<BinaryArrayLayout> {
        let endian = self.required("endian")?;
        let endianness = Endianness::parse(endian)
            .ok_or_else(|| IsotopeSplineError::parse(self.position, format!("unknown byte order '{}'", endian)))?;
        let bits = self.required_u32("precision")?;
        let precision = Precision::from_bits(bits)
            .ok_or_else(|| IsotopeSplineError::parse(self.position, format!("unsupported precision {}", bits)))?;
        let length = self.required_u32("length")? as usize;
        Ok(BinaryArrayLayout {
            endianness,
            precision,
            length,
        })
    }
}

/// binary array element whose text is still being collected
struct PendingArray {
    element: String,
    layout: BinaryArrayLayout,
    text: String,
}

impl PendingArray {
    fn new(element: &str, attributes: &Attributes) -> Result<Self> {
        Ok(PendingArray {
            element: element.to_string(),
            layout: attributes.array_layout()?,
            text: String::new(),
        })
    }

    fn decode(self) -> Result<(String, Vec<f64>)> {
        let values = decode_binary_array(&self.text, self.layout.endianness, self.layout.precision)?;
        if values.len() != self.layout.length {
            return Err(IsotopeSplineError::LengthMismatch {
                element: self.element,
                expected: self.layout.length,
                found: values.len(),
            });
        }
        Ok((self.element, values))
    }
}

fn spline_order(attributes: &Attributes) -> Result<u32> {
    let order = attributes.required_u32("order")?;
    if order != CUBIC_SPLINE_ORDER {
        return Err(IsotopeSplineError::UnsupportedOrder(order));
    }
    Ok(order)
}

fn as_parse_error(position: usize) -> impl Fn(IsotopeSplineError) -> IsotopeSplineError {
    move |e| match e {
        IsotopeSplineError::InvalidArgument(message) => IsotopeSplineError::parse(position, message),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// precursor model documents
// ---------------------------------------------------------------------------

struct PrecursorModel {
    key: ModelKey,
    order: u32,
    knots: Option<Vec<f64>>,
    coefficients: Option<Vec<f64>>,
}

#[derive(Default)]
struct PrecursorDocument {
    header: Option<(u32, u32)>,
    model: Option<PrecursorModel>,
    array: Option<PendingArray>,
    keyed: BTreeMap<ModelKey, CubicSpline>,
}

impl PrecursorDocument {
    fn finish(self) -> Result<ModelCollection> {
        let (max_isotope, max_sulfur) = self
            .header
            .ok_or_else(|| IsotopeSplineError::parse(0, "document has no <models> element"))?;
        ModelCollection::from_keyed(max_isotope, max_sulfur, self.keyed)
    }

    fn finish_model(&mut self, position: usize) -> Result<()> {
        let model = self
            .model
            .take()
            .ok_or_else(|| IsotopeSplineError::parse(position, "unexpected </model>"))?;

        let knots = model
            .knots
            .ok_or_else(|| IsotopeSplineError::parse(position, format!("model {} has no knots", model.key)))?;
        let coefficients = model
            .coefficients
            .ok_or_else(|| IsotopeSplineError::parse(position, format!("model {} has no coefficients", model.key)))?;

        let (a, b, c, d) = regroup_coefficients(&coefficients, model.order)?;
        let spline = CubicSpline::new(knots, a, b, c, d).map_err(as_parse_error(position))?;

        if self.keyed.insert(model.key, spline).is_some() {
            return Err(IsotopeSplineError::parse(position, format!("duplicate model {}", model.key)));
        }
        Ok(())
    }
}

impl DocumentHandler for PrecursorDocument {
    fn start(&mut self, name: &str, attributes: Attributes, position: usize) -> Result<()> {
        match name {
            "models" => {
                let max_isotope = attributes.required_u32("maxIsotope")?;
                let max_sulfur = attributes.required_u32("maxSulfur")?;
                self.header = Some((max_isotope, max_sulfur));
            }
            "model" => {
                if self.header.is_none() {
                    return Err(IsotopeSplineError::parse(position, "<model> outside of <models>"));
                }
                let isotope = attributes.required_u32("isotope")?;
                let num_sulfur = attributes.optional_u32("S")?;
                let order = spline_order(&attributes)?;
                self.model = Some(PrecursorModel {
                    key: ModelKey::new(isotope, num_sulfur),
                    order,
                    knots: None,
                    coefficients: None,
                });
            }
            "knots" | "coefficients" => {
                if self.model.is_none() {
                    return Err(IsotopeSplineError::parse(position, format!("<{}> outside of <model>", name)));
                }
                self.array = Some(PendingArray::new(name, &attributes)?);
            }
            other => warn!("Ignoring unknown element <{}> at byte {}", other, position),
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if let Some(array) = self.array.as_mut() {
            array.text.push_str(text);
        }
    }

    fn end(&mut self, name: &str, position: usize) -> Result<()> {
        match name {
            "knots" | "coefficients" => {
                let array = self
                    .array
                    .take()
                    .ok_or_else(|| IsotopeSplineError::parse(position, format!("unexpected </{}>", name)))?;
                let (element, values) = array.decode()?;
                if let Some(model) = self.model.as_mut() {
                    if element == "knots" {
                        model.knots = Some(values);
                    } else {
                        model.coefficients = Some(values);
                    }
                }
            }
            "model" => self.finish_model(position)?,
            _ => {}
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// fragment model documents
// ---------------------------------------------------------------------------

struct FragmentModel {
    key: FragmentModelKey,
    breaks_precursor: Option<Vec<f64>>,
    breaks_fragment: Option<Vec<f64>>,
    coefficients: Option<Vec<f64>>,
}

#[derive(Default)]
struct FragmentDocument {
    max_isotope: Option<u32>,
    model: Option<FragmentModel>,
    array: Option<PendingArray>,
    models: BTreeMap<FragmentModelKey, TensorProductSpline>,
}

impl FragmentDocument {
    fn finish(self) -> Result<FragmentModelSet> {
        let max_isotope = self
            .max_isotope
            .ok_or_else(|| IsotopeSplineError::parse(0, "document has no <fragmentModels> element"))?;
        Ok(FragmentModelSet {
            max_isotope,
            models: self.models,
        })
    }

    fn finish_model(&mut self, position: usize) -> Result<()> {
        let model = self
            .model
            .take()
            .ok_or_else(|| IsotopeSplineError::parse(position, "unexpected </model>"))?;

        let missing = |what: &str| IsotopeSplineError::parse(position, format!("fragment model has no {}", what));
        let breaks_precursor = model.breaks_precursor.ok_or_else(|| missing("precursorBreaks"))?;
        let breaks_fragment = model.breaks_fragment.ok_or_else(|| missing("fragmentBreaks"))?;
        let coefficients = model.coefficients.ok_or_else(|| missing("coefficients"))?;

        let spline = TensorProductSpline::new(breaks_precursor, breaks_fragment, coefficients)
            .map_err(as_parse_error(position))?;

        if self.models.insert(model.key, spline).is_some() {
            return Err(IsotopeSplineError::parse(position, format!("duplicate fragment model {:?}", model.key)));
        }
        Ok(())
    }
}

impl DocumentHandler for FragmentDocument {
    fn start(&mut self, name: &str, attributes: Attributes, position: usize) -> Result<()> {
        match name {
            "fragmentModels" => {
                self.max_isotope = Some(attributes.required_u32("maxIsotope")?);
            }
            "model" => {
                let max_isotope = self
                    .max_isotope
                    .ok_or_else(|| IsotopeSplineError::parse(position, "<model> outside of <fragmentModels>"))?;
                spline_order(&attributes)?;
                let key = FragmentModelKey {
                    precursor_isotope: attributes.required_u32("precursorIsotope")?,
                    fragment_isotope: attributes.required_u32("fragmentIsotope")?,
                    num_sulfur: attributes.optional_u32("S")?.unwrap_or(0),
                    num_comp_sulfur: attributes.optional_u32("compS")?.unwrap_or(0),
                    num_selenium: attributes.optional_u32("Se")?.unwrap_or(0),
                    num_comp_selenium: attributes.optional_u32("compSe")?.unwrap_or(0),
                };
                if key.precursor_isotope > max_isotope || key.fragment_isotope > key.precursor_isotope {
                    return Err(IsotopeSplineError::parse(
                        position,
                        format!(
                            "fragment isotope {} of precursor isotope {} is outside maxIsotope {}",
                            key.fragment_isotope, key.precursor_isotope, max_isotope
                        ),
                    ));
                }
                self.model = Some(FragmentModel {
                    key,
                    breaks_precursor: None,
                    breaks_fragment: None,
                    coefficients: None,
                });
            }
            "precursorBreaks" | "fragmentBreaks" | "coefficients" => {
                if self.model.is_none() {
                    return Err(IsotopeSplineError::parse(position, format!("<{}> outside of <model>", name)));
                }
                self.array = Some(PendingArray::new(name, &attributes)?);
            }
            other => warn!("Ignoring unknown element <{}> at byte {}", other, position),
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if let Some(array) = self.array.as_mut() {
            array.text.push_str(text);
        }
    }

    fn end(&mut self, name: &str, position: usize) -> Result<()> {
        match name {
            "precursorBreaks" | "fragmentBreaks" | "coefficients" => {
                let array = self
                    .array
                    .take()
                    .ok_or_else(|| IsotopeSplineError::parse(position, format!("unexpected </{}>", name)))?;
                let (element, values) = array.decode()?;
                if let Some(model) = self.model.as_mut() {
                    match element.as_str() {
                        "precursorBreaks" => model.breaks_precursor = Some(values),
                        "fragmentBreaks" => model.breaks_fragment = Some(values),
                        _ => model.coefficients = Some(values),
                    }
                }
            }
            "model" => self.finish_model(position)?,
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(name: &str, values: &[f64]) -> String {
        format!(
            "<{name} endian=\"little\" precision=\"64\" length=\"{}\">{}</{name}>",
            values.len(),
            encode_binary_array(values, Endianness::Little),
            name = name
        )
    }

    fn model(isotope: u32, sulfur: Option<u32>, order: u32, knots: &[f64], coefficients: &[f64]) -> String {
        let s = sulfur.map(|s| format!(" S=\"{}\"", s)).unwrap_or_default();
        format!(
            "<model isotope=\"{}\"{} order=\"{}\">{}{}</model>",
            isotope,
            s,
            order,
            array("knots", knots),
            array("coefficients", coefficients)
        )
    }

    // one isotope, one sulfur count, constant splines
    fn document(order: u32, coefficients: &[f64]) -> String {
        let knots = [100.0, 200.0, 300.0];
        format!(
            "<?xml version=\"1.0\"?><models maxIsotope=\"0\" maxSulfur=\"0\">{}{}</models>",
            model(0, None, order, &knots, coefficients),
            model(0, Some(0), 4, &knots, &[0.5, 0.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0]),
        )
    }

    #[test]
    fn test_load_places_models_by_key() {
        let xml = document(4, &[0.9, 0.0, 0.0, 0.0, 0.9, 0.001, 0.0, 0.0]);
        let collection = load_models_from_str(&xml).unwrap();
        assert_eq!(collection.max_isotope(), 0);
        assert_eq!(collection.max_sulfur(), 0);
        assert!((collection.model(0).unwrap().eval(250.0) - 0.95).abs() < 1e-12);
        assert_eq!(collection.sulfur_model(0, 0).unwrap().eval(150.0), 0.5);
    }

    #[test]
    fn test_regroup_assigns_lowest_power_first() {
        let (a, b, c, d) = regroup_coefficients(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], 4).unwrap();
        assert_eq!(d, vec![1.0, 5.0]);
        assert_eq!(c, vec![2.0, 6.0]);
        assert_eq!(b, vec![3.0, 7.0]);
        assert_eq!(a, vec![4.0, 8.0]);
    }

    #[test]
    fn test_rejects_unsupported_order() {
        let xml = document(3, &[0.9, 0.0, 0.0, 0.9, 0.0, 0.0]);
        assert_eq!(load_models_from_str(&xml).unwrap_err(), IsotopeSplineError::UnsupportedOrder(3));
    }

    #[test]
    fn test_rejects_coefficients_not_multiple_of_order() {
        let xml = document(4, &[0.9, 0.0, 0.0, 0.0, 0.9, 0.0, 0.0]);
        let err = load_models_from_str(&xml).unwrap_err();
        assert!(matches!(err, IsotopeSplineError::LengthMismatch { .. }));
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_rejects_segment_count_mismatch() {
        // three segments of coefficients for two knot intervals
        let xml = document(4, &[0.9; 12]);
        let err = load_models_from_str(&xml).unwrap_err();
        assert!(matches!(err, IsotopeSplineError::LengthMismatch { expected: 2, found: 3, .. }));
    }

    #[test]
    fn test_rejects_declared_length_mismatch() {
        let xml = document(4, &[0.9; 8]).replacen("length=\"3\"", "length=\"4\"", 1);
        let err = load_models_from_str(&xml).unwrap_err();
        assert!(matches!(err, IsotopeSplineError::LengthMismatch { expected: 4, found: 3, .. }));
    }

    #[test]
    fn test_rejects_missing_isotope_attribute() {
        let xml = document(4, &[0.9; 8]).replacen("isotope=\"0\"", "", 1);
        assert!(matches!(load_models_from_str(&xml), Err(IsotopeSplineError::Parse { .. })));
    }

    #[test]
    fn test_rejects_unknown_byte_order() {
        let xml = document(4, &[0.9; 8]).replacen("endian=\"little\"", "endian=\"middle\"", 1);
        assert!(matches!(load_models_from_str(&xml), Err(IsotopeSplineError::Parse { .. })));
    }

    #[test]
    fn test_rejects_malformed_document() {
        let xml = "<models maxIsotope=\"0\" maxSulfur=\"0\"><model isotope=\"0\" order=\"4\"></models>";
        assert!(load_models_from_str(xml).unwrap_err().is_parse_error());
    }

    #[test]
    fn test_rejects_incomplete_collection() {
        let xml = document(4, &[0.9; 8]).replace("maxIsotope=\"0\"", "maxIsotope=\"1\"");
        assert_eq!(
            load_models_from_str(&xml).unwrap_err(),
            IsotopeSplineError::MissingModel { isotope: 1, num_sulfur: None }
        );
    }

    #[test]
    fn test_rejects_duplicate_model() {
        let knots = [100.0, 200.0];
        let single = model(0, None, 4, &knots, &[1.0, 0.0, 0.0, 0.0]);
        let xml = format!("<models maxIsotope=\"0\" maxSulfur=\"0\">{}{}</models>", single, single);
        assert!(matches!(load_models_from_str(&xml), Err(IsotopeSplineError::Parse { .. })));
    }

    #[test]
    fn test_missing_root_element() {
        assert!(matches!(load_models_from_str(""), Err(IsotopeSplineError::Parse { .. })));
    }

    #[test]
    fn test_written_document_loads_back() {
        let xml = document(4, &[0.9, 0.1, -0.01, 0.001, 0.95, 0.0, 0.0, 0.0]);
        let collection = load_models_from_str(&xml).unwrap();
        let written = write_models_to_string(&collection).unwrap();
        let reloaded = load_models_from_str(&written).unwrap();
        assert_eq!(reloaded, collection);
        assert_eq!(reloaded.derived_max_isotope(), reloaded.max_isotope());
        assert_eq!(reloaded.derived_max_sulfur(), reloaded.max_sulfur());
    }

    fn fragment_document(precursor_isotope: u32, fragment_isotope: u32) -> String {
        let breaks = [0.0, 1000.0, 2000.0, 3000.0];
        let mut coefficients = vec![0.0; 9 * 16];
        for patch in 0..9 {
            coefficients[patch * 16 + 15] = 0.4;
        }
        format!(
            "<fragmentModels maxIsotope=\"2\"><model precursorIsotope=\"{}\" fragmentIsotope=\"{}\" S=\"1\" order=\"4\">{}{}{}</model></fragmentModels>",
            precursor_isotope,
            fragment_isotope,
            array("precursorBreaks", &breaks),
            array("fragmentBreaks", &breaks),
            array("coefficients", &coefficients)
        )
    }

    #[test]
    fn test_load_fragment_models() {
        let set = load_fragment_models_from_str(&fragment_document(1, 0)).unwrap();
        assert_eq!(set.max_isotope, 2);
        let key = FragmentModelKey { num_sulfur: 1, ..FragmentModelKey::new(1, 0) };
        let spline = set.models.get(&key).unwrap();
        assert_eq!(spline.evaluate_fragment(1500.0, 500.0), 0.4);
    }

    #[test]
    fn test_fragment_isotope_above_precursor_isotope_is_rejected() {
        let result = load_fragment_models_from_str(&fragment_document(0, 1));
        assert!(matches!(result, Err(IsotopeSplineError::Parse { .. })));
    }

    #[test]
    fn test_fragment_model_requires_all_arrays() {
        let xml = fragment_document(1, 1).replace("fragmentBreaks", "otherBreaks");
        assert!(matches!(load_fragment_models_from_str(&xml), Err(IsotopeSplineError::Parse { .. })));
    }
}
