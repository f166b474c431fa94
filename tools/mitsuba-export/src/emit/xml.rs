//! Mitsuba scene XML building blocks

use std::io::Write;

use glam::{Mat4, Vec3};
use xmltree::{Element, XMLNode};

/// Format a float for an attribute value; `-0` prints as `0`
pub fn num(v: f32) -> String {
    format!("{}", v + 0.0)
}

pub fn triple(v: [f32; 3]) -> String {
    format!("{}, {}, {}", num(v[0]), num(v[1]), num(v[2]))
}

fn element(tag: &str, attributes: &[(&str, String)]) -> Element {
    let mut e = Element::new(tag);
    for (key, value) in attributes {
        e.attributes.insert(key.to_string(), value.clone());
    }
    e
}

pub fn push(parent: &mut Element, child: Element) {
    parent.children.push(XMLNode::Element(child));
}

/// `<tag type="...">`, the form of every Mitsuba plugin element
pub fn plugin(tag: &str, plugin_type: &str) -> Element {
    element(tag, &[("type", plugin_type.to_string())])
}

pub fn with_id(mut e: Element, id: &str) -> Element {
    e.attributes.insert("id".to_string(), id.to_string());
    e
}

pub fn float(name: &str, value: f32) -> Element {
    element("float", &[("name", name.to_string()), ("value", num(value))])
}

pub fn integer(name: &str, value: u32) -> Element {
    element("integer", &[("name", name.to_string()), ("value", value.to_string())])
}

pub fn boolean(name: &str, value: bool) -> Element {
    element("boolean", &[("name", name.to_string()), ("value", value.to_string())])
}

pub fn string(name: &str, value: &str) -> Element {
    element("string", &[("name", name.to_string()), ("value", value.to_string())])
}

pub fn rgb(name: &str, value: [f32; 3]) -> Element {
    element("rgb", &[("name", name.to_string()), ("value", triple(value))])
}

fn xyz(tag: &str, name: &str, v: Vec3) -> Element {
    element(
        tag,
        &[
            ("name", name.to_string()),
            ("x", num(v.x)),
            ("y", num(v.y)),
            ("z", num(v.z)),
        ],
    )
}

pub fn point(name: &str, v: Vec3) -> Element {
    xyz("point", name, v)
}

pub fn vector(name: &str, v: Vec3) -> Element {
    xyz("vector", name, v)
}

/// `<texture type="bitmap">` reading `filename`; `raw` skips sRGB decoding
pub fn bitmap(name: &str, filename: &str, raw: bool) -> Element {
    let mut e = plugin("texture", "bitmap");
    e.attributes.insert("name".to_string(), name.to_string());
    push(&mut e, string("filename", filename));
    if raw {
        push(&mut e, boolean("raw", true));
    }
    e
}

pub fn reference(id: &str) -> Element {
    element("ref", &[("id", id.to_string())])
}

/// `<matrix>` with 16 row-major values
pub fn matrix(m: &Mat4) -> Element {
    let values: Vec<String> = m.transpose().to_cols_array().iter().map(|v| num(*v)).collect();
    element("matrix", &[("value", values.join(" "))])
}

pub fn lookat(origin: Vec3, target: Vec3, up: Vec3) -> Element {
    let t = |v: Vec3| triple(v.to_array());
    element(
        "lookat",
        &[("origin", t(origin)), ("target", t(target)), ("up", t(up))],
    )
}

pub fn scale(v: Vec3) -> Element {
    element(
        "scale",
        &[("x", num(v.x)), ("y", num(v.y)), ("z", num(v.z))],
    )
}

/// `<transform name="...">` holding `ops`, applied first to last
pub fn transform(name: &str, ops: Vec<Element>) -> Element {
    let mut e = element("transform", &[("name", name.to_string())]);
    for op in ops {
        push(&mut e, op);
    }
    e
}

/// Write `root` as an indented XML document
pub fn write_document<W: Write>(root: &Element, w: W) -> std::io::Result<()> {
    root.write_with_config(w, xmltree::EmitterConfig::new().perform_indent(true))
        .map_err(|e| std::io::Error::other(e.to_string()))
}
