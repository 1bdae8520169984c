//! PDF permissions according to ISO 32000-1 Table 22

use bitflags::bitflags;

bitflags! {
    /// User access permissions from the encryption dictionary's `P` entry.
    ///
    /// Bit positions follow the specification's 1-based numbering, so
    /// "bit 3" is `1 << 2`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u32 {
        /// Print the document (bit 3)
        const PRINT = 1 << 2;
        /// Modify contents (bit 4)
        const MODIFY_CONTENTS = 1 << 3;
        /// Copy or extract text and graphics (bit 5)
        const COPY = 1 << 4;
        /// Add or modify annotations, fill forms (bit 6)
        const MODIFY_ANNOTATIONS = 1 << 5;
        /// Fill in form fields (bit 9)
        const FILL_FORMS = 1 << 8;
        /// Extract for accessibility (bit 10)
        const ACCESSIBILITY = 1 << 9;
        /// Assemble the document (bit 11)
        const ASSEMBLE = 1 << 10;
        /// Print at full quality (bit 12)
        const PRINT_HIGH_QUALITY = 1 << 11;

        // Reserved bits are kept as read
        const _ = !0;
    }
}

impl Permissions {
    /// From the signed `P` integer as stored in the file
    pub fn from_p(p: i64) -> Self {
        Self::from_bits_retain(p as i32 as u32)
    }

    pub fn can_print(&self) -> bool {
        self.contains(Self::PRINT)
    }

    pub fn can_modify_contents(&self) -> bool {
        self.contains(Self::MODIFY_CONTENTS)
    }

    pub fn can_copy(&self) -> bool {
        self.contains(Self::COPY)
    }

    pub fn can_modify_annotations(&self) -> bool {
        self.contains(Self::MODIFY_ANNOTATIONS)
    }

    pub fn can_fill_forms(&self) -> bool {
        self.contains(Self::FILL_FORMS)
    }

    pub fn can_access_for_accessibility(&self) -> bool {
        self.contains(Self::ACCESSIBILITY)
    }

    pub fn can_assemble(&self) -> bool {
        self.contains(Self::ASSEMBLE)
    }

    pub fn can_print_high_quality(&self) -> bool {
        self.contains(Self::PRINT_HIGH_QUALITY)
    }
}

impl Default for Permissions {
    /// Unencrypted documents allow everything
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_p() {
        // -4: everything except the two low reserved bits
        let all = Permissions::from_p(-4);
        assert!(all.can_print());
        assert!(all.can_copy());
        assert!(all.can_print_high_quality());
        assert_eq!(all.bits(), 0xFFFF_FFFC);

        // -3904 = 0xFFFFF0C0: nothing granted
        let none = Permissions::from_p(-3904);
        assert!(!none.can_print());
        assert!(!none.can_modify_contents());
        assert!(!none.can_copy());
        assert!(!none.can_access_for_accessibility());
    }

    #[test]
    fn test_individual_bits() {
        let p = Permissions::from_p(0xFFFF_F0C0u32 as i32 as i64 | (1 << 2) | (1 << 9));
        assert!(p.can_print());
        assert!(p.can_access_for_accessibility());
        assert!(!p.can_assemble());
        assert!(!p.can_fill_forms());
    }
}
