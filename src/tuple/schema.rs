use crate::types::Types;

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: Types,
}

impl Field {
    pub fn new(name: &str, ty: Types) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// The schema of a projection onto `attrs`, e.g. an index key.
    pub fn project(&self, attrs: &[usize]) -> Schema {
        Schema::new(attrs.iter().map(|&i| self.fields[i].clone()).collect())
    }
}
