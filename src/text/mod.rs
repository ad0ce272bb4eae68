pub mod brief;
pub mod cleaner;
pub mod normalize;
pub mod sections;

pub use brief::{generate_brief_description, BriefInput};
pub use cleaner::{clean_description_for_storage, CleanInput};
pub use sections::{build_description_sections, DescriptionSections, SectionInput};
