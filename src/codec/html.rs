//! `text/html` rendering. Encoder only.

use std::fmt::Write as _;
use std::time::SystemTime;

use bytes::Bytes;

use crate::codec::{epoch_millis, CodecError, Encoder, ResourceCodec};

pub fn codec() -> ResourceCodec {
    ResourceCodec::new().with_encoder(|| Box::new(HtmlEncoder::new()) as Box<dyn Encoder>)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Resource,
    Properties,
    Members,
    List,
    Map,
}

#[derive(Default)]
pub struct HtmlEncoder {
    out: String,
    stack: Vec<Frame>,
    title: Option<String>,
}

impl HtmlEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn open_item(&mut self) {
        if matches!(self.stack.last(), Some(Frame::List) | Some(Frame::Members)) {
            self.out.push_str("<li>");
        }
    }

    fn close_item(&mut self) {
        if matches!(self.stack.last(), Some(Frame::List) | Some(Frame::Members)) {
            self.out.push_str("</li>");
        }
    }

    fn scalar(&mut self, text: &str, class: &str) -> Result<(), CodecError> {
        self.open_item();
        write!(self.out, "<span class=\"{}\">{}</span>", class, escape(text))
            .map_err(|e| CodecError::Encode(e.to_string()))?;
        self.close_item();
        Ok(())
    }

    fn pop(&mut self, expected: Frame) -> Result<(), CodecError> {
        match self.stack.pop() {
            Some(frame) if frame == expected => Ok(()),
            _ => Err(CodecError::Encode(format!("unbalanced {:?}", expected))),
        }
    }
}

impl Encoder for HtmlEncoder {
    fn start_resource(&mut self, id: Option<&str>, uri: Option<&str>) -> Result<(), CodecError> {
        if self.title.is_none() {
            self.title = Some(id.or(uri).unwrap_or("resource").to_string());
        }
        self.open_item();
        self.out.push_str("<div class=\"resource\">");
        let label = escape(id.unwrap_or(""));
        match uri {
            Some(uri) => {
                let _ = write!(self.out, "<h2><a href=\"{}\">{}</a></h2>", escape(uri), label);
            }
            None => {
                let _ = write!(self.out, "<h2>{}</h2>", label);
            }
        }
        self.stack.push(Frame::Resource);
        Ok(())
    }

    fn end_resource(&mut self) -> Result<(), CodecError> {
        self.pop(Frame::Resource)?;
        self.out.push_str("</div>");
        self.close_item();
        Ok(())
    }

    fn start_properties(&mut self) -> Result<(), CodecError> {
        self.out.push_str("<table class=\"properties\">");
        self.stack.push(Frame::Properties);
        Ok(())
    }

    fn end_properties(&mut self) -> Result<(), CodecError> {
        self.pop(Frame::Properties)?;
        self.out.push_str("</table>");
        Ok(())
    }

    fn start_property(&mut self, name: &str) -> Result<(), CodecError> {
        let _ = match self.stack.last() {
            Some(Frame::Map) => write!(self.out, "<dt>{}</dt><dd>", escape(name)),
            _ => write!(self.out, "<tr><th>{}</th><td>", escape(name)),
        };
        Ok(())
    }

    fn end_property(&mut self, _name: &str) -> Result<(), CodecError> {
        match self.stack.last() {
            Some(Frame::Map) => self.out.push_str("</dd>"),
            _ => self.out.push_str("</td></tr>"),
        }
        Ok(())
    }

    fn start_members(&mut self) -> Result<(), CodecError> {
        self.out.push_str("<ol class=\"members\">");
        self.stack.push(Frame::Members);
        Ok(())
    }

    fn end_members(&mut self) -> Result<(), CodecError> {
        self.pop(Frame::Members)?;
        self.out.push_str("</ol>");
        Ok(())
    }

    fn start_list(&mut self) -> Result<(), CodecError> {
        self.open_item();
        self.out.push_str("<ul>");
        self.stack.push(Frame::List);
        Ok(())
    }

    fn end_list(&mut self) -> Result<(), CodecError> {
        self.pop(Frame::List)?;
        self.out.push_str("</ul>");
        self.close_item();
        Ok(())
    }

    fn start_map(&mut self) -> Result<(), CodecError> {
        self.open_item();
        self.out.push_str("<dl>");
        self.stack.push(Frame::Map);
        Ok(())
    }

    fn end_map(&mut self) -> Result<(), CodecError> {
        self.pop(Frame::Map)?;
        self.out.push_str("</dl>");
        self.close_item();
        Ok(())
    }

    fn write_null(&mut self) -> Result<(), CodecError> {
        self.scalar("null", "null")
    }

    fn write_bool(&mut self, value: bool) -> Result<(), CodecError> {
        self.scalar(if value { "true" } else { "false" }, "boolean")
    }

    fn write_integer(&mut self, value: i64) -> Result<(), CodecError> {
        self.scalar(&value.to_string(), "number")
    }

    fn write_float(&mut self, value: f64) -> Result<(), CodecError> {
        self.scalar(&value.to_string(), "number")
    }

    fn write_text(&mut self, value: &str) -> Result<(), CodecError> {
        self.scalar(value, "string")
    }

    fn write_date(&mut self, value: SystemTime) -> Result<(), CodecError> {
        self.scalar(&epoch_millis(value).to_string(), "date")
    }

    fn finish(self: Box<Self>) -> Result<Bytes, CodecError> {
        if !self.stack.is_empty() {
            return Err(CodecError::Encode("document ended inside a structure".into()));
        }
        let title = escape(self.title.as_deref().unwrap_or("resource"));
        let page = format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{}</title></head><body>{}</body></html>",
            title, self.out
        );
        Ok(Bytes::from(page))
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
