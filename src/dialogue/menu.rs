//! Menu and message construction — every render the dialogue produces.

use crate::dialogue::event::ControlToken;
use crate::model::{Category, DeliveryHour, Quote, Rating};
use crate::transport::{Button, Render};

fn control(label: &str, token: ControlToken) -> Button {
    Button::new(label, token.as_token())
}

fn back_control() -> Button {
    control("< Back", ControlToken::Back)
}

/// `/start` welcome text.
pub fn welcome() -> Render {
    Render::text(
        "*What can this bot do?*\n\n\
         Quotecast sends you one hand-picked quote every day, in a category \
         and at a time of your choosing, and listens to what you thought of it.\n\n\
         Use /select\\_category to subscribe.",
    )
}

/// Root category menu — one control per category, nothing else.
pub fn category_menu() -> Render {
    let rows = Category::ALL
        .iter()
        .map(|c| vec![control(c.label(), ControlToken::Category(*c))])
        .collect();
    Render::menu("What category would you like to choose?", rows)
}

/// Fixed time-of-day choices plus a back control.
pub fn time_menu() -> Render {
    let mut rows: Vec<Vec<Button>> = DeliveryHour::ALL
        .iter()
        .map(|h| vec![control(h.label(), ControlToken::Hour(*h))])
        .collect();
    rows.push(vec![back_control()]);
    Render::menu("At what time would you like to receive quotes?", rows)
}

/// Subscription confirmation naming the chosen category and hour.
pub fn subscription_confirmed(category: Category, hour: DeliveryHour) -> Render {
    Render::text(format!(
        "Got it! You will be getting quotes about *{}* at *{}* every day!",
        category.label(),
        hour.clock(),
    ))
}

/// The delivered quote itself.
pub fn quote(quote: &Quote) -> Render {
    match &quote.author {
        Some(author) => Render::text(format!("_{}_\n\n— {author}", quote.content)),
        None => Render::text(format!("_{}_", quote.content)),
    }
}

/// Rating controls, sent right after a delivery.
pub fn rating_menu() -> Render {
    let rows = Rating::ALL
        .iter()
        .map(|r| vec![control(r.label(), ControlToken::Rating(*r))])
        .collect();
    Render::menu("How was today's quote?", rows)
}

/// Rating-specific clarification options plus back.
pub fn clarification_menu(rating: Rating) -> Render {
    let prompt = match rating {
        Rating::Excellent => "Wonderful! What made it great?",
        Rating::Good => "Glad you liked it. What worked for you?",
        Rating::Bad => "Sorry to hear that. What went wrong?",
    };
    let mut rows: Vec<Vec<Button>> = rating
        .clarifications()
        .iter()
        .map(|t| vec![control(t.label(), ControlToken::Clarification(*t))])
        .collect();
    rows.push(vec![back_control()]);
    Render::menu(prompt, rows)
}

/// Yes/no comment decision.
pub fn comment_decision() -> Render {
    Render::menu(
        "Would you like to add a comment?",
        vec![vec![
            control("Yes ✍️", ControlToken::CommentYes),
            control("No, I'm done", ControlToken::CommentNo),
        ]],
    )
}

/// Free-text comment prompt with the word-limit notice and a cancel control.
pub fn comment_prompt(word_limit: usize) -> Render {
    Render::menu(
        format!("Send your comment as a message (up to {word_limit} words)."),
        vec![vec![control("Cancel", ControlToken::CommentCancel)]],
    )
}

/// Yes/no cancel confirmation.
pub fn cancel_confirm() -> Render {
    Render::menu(
        "Discard your comment?",
        vec![vec![
            control("Yes, discard", ControlToken::CancelYes),
            control("Keep writing", ControlToken::CancelNo),
        ]],
    )
}

/// Closing thanks after feedback is finalized.
pub fn thanks() -> Render {
    Render::text("Thanks for your feedback! 🙏")
}

/// Generic retry notice for persistence failures.
pub fn retry_notice() -> Render {
    Render::text("Something went wrong on our side. Please try again.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_menu_has_one_control_per_category_and_no_back() {
        let menu = category_menu();
        assert_eq!(menu.controls.len(), Category::ALL.len());
        let tokens: Vec<&str> = menu
            .controls
            .iter()
            .flatten()
            .map(|b| b.token.as_str())
            .collect();
        assert_eq!(tokens, ["cat:happiness", "cat:love", "cat:hope"]);
        assert!(!tokens.contains(&"back"));
    }

    #[test]
    fn time_menu_offers_fixed_hours_plus_back() {
        let menu = time_menu();
        let tokens: Vec<&str> = menu
            .controls
            .iter()
            .flatten()
            .map(|b| b.token.as_str())
            .collect();
        assert_eq!(tokens, ["hour:8", "hour:12", "hour:18", "back"]);
    }

    #[test]
    fn confirmation_names_category_and_hour() {
        let render = subscription_confirmed(Category::Love, DeliveryHour::Noon);
        assert!(render.text.contains("Love"));
        assert!(render.text.contains("12:00"));
    }

    #[test]
    fn clarification_menus_differ_per_rating() {
        for rating in Rating::ALL {
            let menu = clarification_menu(rating);
            // 3 options + back
            assert_eq!(menu.controls.len(), 4);
            assert_eq!(menu.controls[3][0].token, "back");
        }
        assert_ne!(
            clarification_menu(Rating::Bad).text,
            clarification_menu(Rating::Excellent).text
        );
    }

    #[test]
    fn comment_prompt_names_word_limit() {
        let render = comment_prompt(60);
        assert!(render.text.contains("60 words"));
        assert_eq!(render.controls[0][0].token, "comment:cancel");
    }

    #[test]
    fn quote_render_includes_author_when_known() {
        let q = Quote::new(Category::Hope, "While there's life, there's hope.", Some("Cicero"));
        assert!(quote(&q).text.contains("Cicero"));

        let anon = Quote::new(Category::Hope, "Hope is a waking dream.", None);
        assert!(!quote(&anon).text.contains("—"));
    }
}
