//! Inline keyboard builders shared by the wizards.

use crate::currency::{price_from_telegram, CurrencyTable};
use crate::db::{Product, TourTranslation};
use crate::event::CallbackData;
use crate::gateway::{Button, Keyboard};
use crate::localization::t_lang;

/// Cancel button appended under every selection list.
pub fn abort_row(lang: Option<&str>) -> Vec<Button> {
    vec![Button::new(
        t_lang("btn-cancel", lang),
        CallbackData::new("flow", "abort"),
    )]
}

/// One button per translation, labelled `"title (language)"`, arg is the
/// translation id.
pub fn translation_keyboard(
    ns: &str,
    translations: &[TourTranslation],
    lang: Option<&str>,
) -> Keyboard {
    let mut keyboard = Keyboard::new();
    for translation in translations {
        let label = format!("{} ({})", translation.title, translation.language);
        keyboard = keyboard.row(vec![Button::new(
            label,
            CallbackData::with_arg(ns, "pick", translation.id),
        )]);
    }
    keyboard.row(abort_row(lang))
}

/// Language choices for a new translation, labelled in the viewer's language.
pub fn locale_keyboard(codes: &[String], lang: Option<&str>) -> Keyboard {
    let buttons = codes
        .iter()
        .map(|code| {
            Button::new(
                language_label(code, lang),
                CallbackData::with_arg("lang", "pick", code),
            )
        })
        .collect();
    Keyboard::new().row(buttons).row(abort_row(lang))
}

/// Display name of a locale code, falling back to the code itself.
pub fn language_label(code: &str, lang: Option<&str>) -> String {
    let key = format!("lang-{code}");
    let label = t_lang(&key, lang);
    if label.starts_with("Missing translation") {
        code.to_string()
    } else {
        label
    }
}

/// One button per product, labelled `"title (price)"`, arg is the product id.
pub fn product_keyboard(
    products: &[Product],
    currencies: &CurrencyTable,
    lang: Option<&str>,
) -> Keyboard {
    let mut keyboard = Keyboard::new();
    for product in products {
        let price = match currencies.get(&product.currency) {
            Some(entry) => price_from_telegram(entry, product.amount_minor),
            None => format!("{} {}", product.amount_minor, product.currency),
        };
        let label = format!("{} ({})", product.title, price);
        keyboard = keyboard.row(vec![Button::new(
            label,
            CallbackData::with_arg("prod", "pick", product.id),
        )]);
    }
    keyboard.row(abort_row(lang))
}

/// Convert-or-keep choice offered after an audio upload.
pub fn audio_choice_keyboard(lang: Option<&str>) -> Keyboard {
    Keyboard::new().row(vec![
        Button::new(
            t_lang("btn-convert-voice", lang),
            CallbackData::new("audio", "convert"),
        ),
        Button::new(
            t_lang("btn-keep-audio", lang),
            CallbackData::new("audio", "keep"),
        ),
    ])
}

/// Recovery choices after a failed conversion.
pub fn audio_retry_keyboard(lang: Option<&str>) -> Keyboard {
    Keyboard::single_column(vec![
        Button::new(t_lang("btn-retry", lang), CallbackData::new("audio", "retry")),
        Button::new(
            t_lang("btn-keep-audio", lang),
            CallbackData::new("audio", "keep"),
        ),
        Button::new(
            t_lang("btn-discard", lang),
            CallbackData::new("audio", "discard"),
        ),
    ])
}

/// Delete-or-keep confirmation for tour removal.
pub fn confirm_delete_keyboard(lang: Option<&str>) -> Keyboard {
    Keyboard::new().row(vec![
        Button::new(t_lang("btn-delete", lang), CallbackData::new("del", "confirm")),
        Button::new(t_lang("btn-keep", lang), CallbackData::new("del", "abort")),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn translation(id: i64, title: &str, language: &str) -> TourTranslation {
        TourTranslation {
            id,
            tour_id: 1,
            language: language.to_string(),
            title: title.to_string(),
            description: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn translation_keyboard_has_one_row_per_tour_plus_cancel() {
        let keyboard = translation_keyboard(
            "edit",
            &[translation(1, "Old town", "en"), translation(2, "Vieille ville", "fr")],
            None,
        );
        assert_eq!(keyboard.rows.len(), 3);
        assert_eq!(keyboard.rows[0][0].label, "Old town (en)");
        assert_eq!(keyboard.rows[0][0].data.encode(), "edit:pick:1");
        assert_eq!(keyboard.rows[2][0].data.encode(), "flow:abort");
    }

    #[test]
    fn audio_choice_encodes_namespace() {
        let keyboard = audio_choice_keyboard(None);
        let codes: Vec<String> = keyboard.rows[0].iter().map(|b| b.data.encode()).collect();
        assert_eq!(codes, vec!["audio:convert", "audio:keep"]);
    }

    #[test]
    fn locale_keyboard_labels_unknown_codes_verbatim() {
        let codes = vec!["en".to_string(), "nl".to_string()];
        let keyboard = locale_keyboard(&codes, None);
        assert_eq!(keyboard.rows[0][1].label, "nl");
        assert_eq!(keyboard.rows[0][1].data.encode(), "lang:pick:nl");
        assert_eq!(keyboard.rows[1][0].data.encode(), "flow:abort");
    }
}
