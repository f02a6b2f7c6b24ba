//! Default model catalogue, sized by system RAM

use tracing::{debug, info};

/// A model lmapp knows how to fetch for each backend
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultModel {
    /// Short name, also used as the llamafile model file stem
    pub name: &'static str,
    /// Tag passed to `ollama pull`
    pub ollama_tag: &'static str,
    /// GGUF weights served by llamafile
    pub gguf_url: &'static str,
    /// Approximate RAM required in GB
    pub ram_required_gb: f64,
    pub display_name: &'static str,
    pub params: &'static str,
}

impl DefaultModel {
    pub const MISTRAL_7B: DefaultModel = DefaultModel {
        name: "mistral",
        ollama_tag: "mistral",
        gguf_url: "https://huggingface.co/TheBloke/Mistral-7B-Instruct-v0.2-GGUF/resolve/main/mistral-7b-instruct-v0.2.Q4_K_M.gguf",
        ram_required_gb: 8.0,
        display_name: "Mistral 7B Instruct",
        params: "7B",
    };

    pub const PHI3_MINI: DefaultModel = DefaultModel {
        name: "phi3",
        ollama_tag: "phi3:mini",
        gguf_url: "https://huggingface.co/microsoft/Phi-3-mini-4k-instruct-gguf/resolve/main/Phi-3-mini-4k-instruct-q4.gguf",
        ram_required_gb: 4.0,
        display_name: "Phi-3 Mini",
        params: "3.8B",
    };

    pub const TINYLLAMA: DefaultModel = DefaultModel {
        name: "tinyllama",
        ollama_tag: "tinyllama",
        gguf_url: "https://huggingface.co/TheBloke/TinyLlama-1.1B-Chat-v1.0-GGUF/resolve/main/tinyllama-1.1b-chat-v1.0.Q4_K_M.gguf",
        ram_required_gb: 0.0,
        display_name: "TinyLlama 1.1B Chat",
        params: "1.1B",
    };

    /// All models in order of preference (largest first)
    pub const ALL_MODELS: &'static [DefaultModel] =
        &[Self::MISTRAL_7B, Self::PHI3_MINI, Self::TINYLLAMA];
}

/// Chooses a default model for the measured RAM
pub struct ModelCatalog;

impl ModelCatalog {
    /// Largest model that fits `ram_gb`; TinyLlama always fits
    pub fn for_ram(ram_gb: f64) -> &'static DefaultModel {
        let selected = DefaultModel::ALL_MODELS
            .iter()
            .find(|model| model.ram_required_gb <= ram_gb)
            .unwrap_or(&DefaultModel::TINYLLAMA);

        info!(
            "Selected default model: {} ({} params) for {:.1}GB RAM",
            selected.display_name, selected.params, ram_gb
        );
        selected
    }

    /// Looks a model up by its short name or ollama tag
    pub fn find(name: &str) -> Option<&'static DefaultModel> {
        let needle = name.trim().to_lowercase();
        let found = DefaultModel::ALL_MODELS
            .iter()
            .find(|m| m.name == needle || m.ollama_tag == needle);
        debug!("Catalogue lookup '{}' -> {:?}", name, found.map(|m| m.name));
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_by_ram() {
        assert_eq!(ModelCatalog::for_ram(16.0).name, "mistral");
        assert_eq!(ModelCatalog::for_ram(8.0).name, "mistral");
        assert_eq!(ModelCatalog::for_ram(6.0).name, "phi3");
        assert_eq!(ModelCatalog::for_ram(2.0).name, "tinyllama");
        assert_eq!(ModelCatalog::for_ram(0.5).name, "tinyllama");
    }

    #[test]
    fn test_find_by_name_or_tag() {
        assert_eq!(ModelCatalog::find("phi3:mini").map(|m| m.name), Some("phi3"));
        assert_eq!(ModelCatalog::find("TinyLlama").map(|m| m.name), Some("tinyllama"));
        assert!(ModelCatalog::find("gpt-4").is_none());
    }

    #[test]
    fn test_catalogue_is_largest_first() {
        let sizes: Vec<f64> = DefaultModel::ALL_MODELS
            .iter()
            .map(|m| m.ram_required_gb)
            .collect();
        assert!(sizes.windows(2).all(|w| w[0] >= w[1]));
    }
}
