use anyhow::Result;
use fluent_bundle::{FluentBundle, FluentResource};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use unic_langid::LanguageIdentifier;

/// Locales shipped with the bot, in display order. UI copy exists for each of
/// them; they also seed the default tour language list.
pub const SUPPORTED_LOCALES: &[&str] = &["en", "fr"];

/// Localization manager for the tour bot
pub struct LocalizationManager {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
}

impl LocalizationManager {
    /// Create a new localization manager
    pub fn new() -> Result<Self> {
        let mut bundles = HashMap::new();

        for locale_str in SUPPORTED_LOCALES {
            let locale: LanguageIdentifier = locale_str.parse()?;
            let bundle = Self::create_bundle(&locale)?;
            bundles.insert(locale_str.to_string(), bundle);
        }

        Ok(Self { bundles })
    }

    /// Create a fluent bundle for a specific locale
    fn create_bundle(locale: &LanguageIdentifier) -> Result<FluentBundle<FluentResource>> {
        let mut bundle = FluentBundle::new(vec![locale.clone()]);

        // Load the main resource file - path relative to Cargo.toml
        let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
        let resource_path = format!("{}/locales/{}/main.ftl", manifest_dir, locale);
        if let Ok(content) = fs::read_to_string(&resource_path) {
            if let Ok(resource) = FluentResource::try_new(content) {
                let _ = bundle.add_resource(resource);
            }
        }

        Ok(bundle)
    }

    /// Get a localized message in a specific language
    pub fn get_message_in_language(
        &self,
        key: &str,
        language: &str,
        args: Option<&HashMap<&str, &str>>,
    ) -> String {
        let bundle = match self.bundles.get(language) {
            Some(bundle) => bundle,
            None => {
                // Fallback to English if language not found
                match self.bundles.get("en") {
                    Some(bundle) => bundle,
                    None => return format!("Missing translation: {}", key),
                }
            }
        };

        let msg = match bundle.get_message(key) {
            Some(msg) => msg,
            None => return format!("Missing translation: {}", key),
        };

        let pattern = match msg.value() {
            Some(pattern) => pattern,
            None => return format!("Missing value for key: {}", key),
        };

        let mut value = String::new();

        if let Some(args) = args {
            let fluent_args = fluent_bundle::FluentArgs::from_iter(
                args.iter()
                    .map(|(k, v)| (*k, fluent_bundle::FluentValue::from(*v))),
            );

            let _ = bundle.write_pattern(&mut value, pattern, Some(&fluent_args), &mut vec![]);
        } else {
            let _ = bundle.write_pattern(&mut value, pattern, None, &mut vec![]);
        }

        value
    }

    /// Get a localized message with arguments in a specific language
    pub fn get_message_with_args_in_language(
        &self,
        key: &str,
        language: &str,
        args: &[(&str, &str)],
    ) -> String {
        let args_map: HashMap<&str, &str> = args.iter().cloned().collect();
        self.get_message_in_language(key, language, Some(&args_map))
    }

    /// Check if a language is supported
    pub fn is_language_supported(&self, language: &str) -> bool {
        self.bundles.contains_key(language)
    }
}

thread_local! {
    static LOCALIZATION_MANAGER: RefCell<Option<LocalizationManager>> = const { RefCell::new(None) };
}

/// Initialize the thread-local localization manager
pub fn init_localization() -> Result<()> {
    LOCALIZATION_MANAGER.with(|cell| {
        let mut manager = cell.borrow_mut();
        if manager.is_none() {
            *manager = Some(LocalizationManager::new()?);
        }
        Ok(())
    })
}

/// Run `f` against this thread's manager, initializing it on first use.
/// Handlers run on arbitrary worker threads, so every thread may need its
/// own lazy init.
fn with_manager<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&LocalizationManager) -> R,
{
    LOCALIZATION_MANAGER.with(|cell| {
        {
            let mut slot = cell.borrow_mut();
            if slot.is_none() {
                match LocalizationManager::new() {
                    Ok(manager) => *slot = Some(manager),
                    Err(err) => {
                        tracing::error!(error = %err, "Failed to initialize localization");
                        return None;
                    }
                }
            }
        }
        let slot = cell.borrow();
        slot.as_ref().map(f)
    })
}

/// Convenience function to get a localized message in user's language
pub fn t_lang(key: &str, language_code: Option<&str>) -> String {
    let language = detect_language(language_code);
    with_manager(|manager| manager.get_message_in_language(key, &language, None))
        .unwrap_or_else(|| format!("Missing translation: {}", key))
}

/// Convenience function to get a localized message with arguments in user's language
pub fn t_args_lang(key: &str, args: &[(&str, &str)], language_code: Option<&str>) -> String {
    let language = detect_language(language_code);
    with_manager(|manager| manager.get_message_with_args_in_language(key, &language, args))
        .unwrap_or_else(|| format!("Missing translation: {}", key))
}

/// Detect the appropriate language based on user's Telegram language code
pub fn detect_language(language_code: Option<&str>) -> String {
    if let Some(code) = language_code {
        // Extract language code (e.g., "fr-FR" -> "fr", "en-US" -> "en")
        let lang = if code.contains('-') {
            code.split('-').next().unwrap_or("en")
        } else {
            code
        };

        let supported =
            with_manager(|manager| manager.is_language_supported(lang)).unwrap_or(false);

        if supported {
            return lang.to_string();
        }
    }

    // Default to English if language not supported or not provided
    "en".to_string()
}
