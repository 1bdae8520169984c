use std::fmt;

/// Identity of an indirect object: object number plus generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectId {
    number: u32,
    generation: u16,
}

impl ObjectId {
    pub fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn generation(&self) -> u16 {
        self.generation
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

impl From<(u32, u16)> for ObjectId {
    fn from((number, generation): (u32, u16)) -> Self {
        Self::new(number, generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_accessors_and_display() {
        let id = ObjectId::new(12, 3);
        assert_eq!(id.number(), 12);
        assert_eq!(id.generation(), 3);
        assert_eq!(id.to_string(), "12 3 R");
        assert_eq!(ObjectId::from((12, 3)), id);
    }

    #[test]
    fn test_object_id_ordering() {
        let mut ids = vec![ObjectId::new(2, 0), ObjectId::new(1, 5), ObjectId::new(1, 0)];
        ids.sort();
        assert_eq!(
            ids,
            vec![ObjectId::new(1, 0), ObjectId::new(1, 5), ObjectId::new(2, 0)]
        );
    }
}
