//! Maps each [`TargetType`] to its registered [`Extractor`]. Adding a new
//! target type means extending the enum, adding an implementation, and
//! registering it here — no open-class plugin discovery.

use std::collections::HashMap;

use scraper_common::model::TargetType;

use crate::base::Extractor;
use crate::extractors::{
    company_website::CompanyWebsiteExtractor, job_posting::JobPostingExtractor,
    linkedin::LinkedinProfileExtractor,
};

pub struct ExtractorRegistry {
    extractors: HashMap<TargetType, Box<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// Builds the registry with every built-in extractor registered.
    pub fn new() -> Self {
        let mut extractors: HashMap<TargetType, Box<dyn Extractor>> = HashMap::new();
        extractors.insert(
            TargetType::LinkedinProfile,
            Box::new(LinkedinProfileExtractor),
        );
        extractors.insert(
            TargetType::CompanyWebsite,
            Box::new(CompanyWebsiteExtractor),
        );
        extractors.insert(TargetType::JobPosting, Box::new(JobPostingExtractor));
        Self { extractors }
    }

    pub fn get(&self, target_type: TargetType) -> Option<&dyn Extractor> {
        self.extractors.get(&target_type).map(|b| b.as_ref())
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_target_type_has_an_extractor() {
        let registry = ExtractorRegistry::new();
        assert!(registry.get(TargetType::LinkedinProfile).is_some());
        assert!(registry.get(TargetType::CompanyWebsite).is_some());
        assert!(registry.get(TargetType::JobPosting).is_some());
    }
}
