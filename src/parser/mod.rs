//
//  mod.rs
//  Restructure
//
//  Created by hak (tharun)
//

pub mod extractor;
pub mod language;

pub use extractor::{
    extract_file, ExtractorBackend, PatternExtractor, ReferenceExtractor, SyntaxExtractor,
};
pub use language::SupportedLanguage;
