use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type Attrs = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Insert {
    Text(String),
    /// A single embed keyed by its type name, e.g. `{"image": "cover.png"}`.
    Embed(Attrs),
}

impl Insert {
    pub fn len(&self) -> usize {
        match self {
            Insert::Text(text) => text.chars().count(),
            Insert::Embed(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Insert::Text(text) => Some(text),
            Insert::Embed(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaOp {
    pub insert: Insert,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attrs>,
}

impl DeltaOp {
    pub fn attrs(&self) -> Option<&Attrs> {
        self.attributes.as_ref()
    }
}

/// An append-only list of insert operations describing document content.
///
/// Builder calls consume and return the delta so accumulation reads as a
/// fold: `Delta::new().insert("a").insert_with("\n", attrs)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub ops: Vec<DeltaOp>,
}

/// One logical line of a delta: its content runs and the attributes carried
/// by the line's break.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub delta: Delta,
    pub attrs: Attrs,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(self, text: impl Into<String>) -> Self {
        self.insert_op(Insert::Text(text.into()), None)
    }

    pub fn insert_with(self, text: impl Into<String>, attrs: Attrs) -> Self {
        self.insert_op(Insert::Text(text.into()), Some(attrs))
    }

    pub fn insert_embed(self, embed: Attrs, attrs: Option<Attrs>) -> Self {
        self.insert_op(Insert::Embed(embed), attrs)
    }

    fn insert_op(mut self, insert: Insert, attrs: Option<Attrs>) -> Self {
        self.push(DeltaOp {
            insert,
            attributes: attrs,
        });
        self
    }

    /// Appends `op`, dropping empty text and folding it into the previous op
    /// when both are text runs with equal attributes.
    pub fn push(&mut self, mut op: DeltaOp) {
        if op.insert.is_empty() {
            return;
        }
        if op.attributes.as_ref().is_some_and(|attrs| attrs.is_empty()) {
            op.attributes = None;
        }

        if let Some(last) = self.ops.last_mut() {
            if last.attributes == op.attributes {
                if let (Insert::Text(prev), Insert::Text(next)) = (&mut last.insert, &op.insert) {
                    prev.push_str(next);
                    return;
                }
            }
        }
        self.ops.push(op);
    }

    pub fn ops(&self) -> &[DeltaOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn length(&self) -> usize {
        self.ops.iter().map(|op| op.insert.len()).sum()
    }

    pub fn concat(mut self, other: Delta) -> Self {
        for op in other.ops {
            self.push(op);
        }
        self
    }

    /// Splits the delta at each `\n`. Trailing content without a break is
    /// returned as a final line with no attributes.
    pub fn lines(&self) -> Vec<Line> {
        let mut lines = Vec::new();
        let mut current = Delta::new();

        for op in &self.ops {
            let Insert::Text(text) = &op.insert else {
                current.push(op.clone());
                continue;
            };

            let mut rest = text.as_str();
            while let Some(ix) = rest.find('\n') {
                if ix > 0 {
                    current.push(DeltaOp {
                        insert: Insert::Text(rest[..ix].to_string()),
                        attributes: op.attributes.clone(),
                    });
                }
                lines.push(Line {
                    delta: std::mem::take(&mut current),
                    attrs: op.attributes.clone().unwrap_or_default(),
                });
                rest = &rest[ix + 1..];
            }
            if !rest.is_empty() {
                current.push(DeltaOp {
                    insert: Insert::Text(rest.to_string()),
                    attributes: op.attributes.clone(),
                });
            }
        }

        if !current.is_empty() {
            lines.push(Line {
                delta: current,
                attrs: Attrs::new(),
            });
        }
        lines
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json_str(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn attrs(name: &str, value: serde_json::Value) -> Attrs {
        Attrs::from([(name.to_string(), value)])
    }

    #[test]
    fn insert_merges_runs_with_equal_attributes() {
        let delta = Delta::new()
            .insert("ab")
            .insert("")
            .insert("c")
            .insert_with("\n", attrs("verse", json!(true)))
            .insert_with("\n", attrs("verse", json!(true)));

        assert_eq!(delta.ops().len(), 2);
        assert_eq!(delta.ops()[0].insert, Insert::Text("abc".into()));
        assert_eq!(delta.ops()[1].insert, Insert::Text("\n\n".into()));
        assert_eq!(delta.length(), 5);
    }

    #[test]
    fn lines_carry_break_attributes() {
        let quote = attrs("verse", json!(true));
        let delta = Delta::new()
            .insert("one")
            .insert_with("\n", quote.clone())
            .insert("two\nthree");

        let lines = delta.lines();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].delta, Delta::new().insert("one"));
        assert_eq!(lines[0].attrs, quote);
        assert_eq!(lines[1].delta, Delta::new().insert("two"));
        assert!(lines[1].attrs.is_empty());
        assert_eq!(lines[2].delta, Delta::new().insert("three"));
    }

    #[test]
    fn json_uses_insert_attributes_shape() {
        let delta = Delta::new()
            .insert_embed(attrs("image", json!("cover.png")), None)
            .insert_with("\n", attrs("align", json!("center")));

        let value = serde_json::to_value(&delta).unwrap();
        assert_eq!(
            value,
            json!({"ops": [
                {"insert": {"image": "cover.png"}},
                {"insert": "\n", "attributes": {"align": "center"}},
            ]})
        );
        assert_eq!(Delta::from_json_str(&value.to_string()).unwrap(), delta);
    }
}
