//! Server-rendered admin pages.

use html_escape::encode_text;

use crate::services::SessionAdmin;

const STYLE: &str = "body{font-family:system-ui,sans-serif;max-width:28rem;margin:4rem auto;padding:0 1rem}\
label{display:block;margin-top:1rem}input{width:100%;padding:.5rem;box-sizing:border-box}\
button{margin-top:1.5rem;padding:.5rem 1rem}.error{color:#b00020}";

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        title = encode_text(title),
    )
}

#[must_use]
pub fn login_page(error: Option<&str>) -> String {
    let error_html = error
        .map(|msg| format!("<p class=\"error\" role=\"alert\">{}</p>\n", encode_text(msg)))
        .unwrap_or_default();

    let body = format!(
        "<h1>Academy admin</h1>\n{error_html}\
         <form method=\"post\" action=\"/admin/login\">\n\
         <label for=\"username\">Username</label>\n\
         <input id=\"username\" name=\"username\" autocomplete=\"username\" required>\n\
         <label for=\"password\">Password</label>\n\
         <input id=\"password\" name=\"password\" type=\"password\" autocomplete=\"current-password\" required>\n\
         <button type=\"submit\">Sign in</button>\n\
         </form>"
    );

    layout("Sign in", &body)
}

#[must_use]
pub fn dashboard(admin: &SessionAdmin) -> String {
    let email = admin
        .email
        .as_deref()
        .map(|e| format!(" ({})", encode_text(e)))
        .unwrap_or_default();

    let body = format!(
        "<h1>Academy admin</h1>\n\
         <p>Signed in as <strong>{username}</strong>{email}.</p>\n\
         <p><a href=\"/admin/logout\">Sign out</a></p>",
        username = encode_text(&admin.username),
    );

    layout("Dashboard", &body)
}
