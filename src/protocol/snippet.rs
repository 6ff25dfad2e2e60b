//! Client-executable snippets returned to the sanctioned runtime.
//!
//! The sanctioned client can only run `loadstring(game:HttpGet(url))()` style
//! code, so the GET-only endpoints answer with small Lua programs instead of
//! JSON.

/// Fixed snippet returned for every failed GET-style key verification.
pub const INVALID_KEY_SNIPPET: &str = "error('Invalid key')";

/// Snippet that fetches and runs the code at `url`.
pub fn fetch_and_run(url: &str) -> String {
    format!("loadstring(game:HttpGet(\"{}\"))()", lua_escape(url))
}

/// Loader that asks the user for a key and verifies it.
pub fn loader(resource_id: &str, base_url: &str, unlock_url: Option<&str>) -> String {
    let verify_url = format!("{}/verify/{}?key=", base_url, resource_id);
    format!(
        r#"local RESOURCE_ID = "{id}"
local KEY_LINK = "{link}"
local VERIFY_URL = "{verify}"

if KEY_LINK ~= "" and setclipboard then
    setclipboard(KEY_LINK)
    print("Key link copied to clipboard: " .. KEY_LINK)
end

local function redeem(key)
    local code = game:HttpGet(VERIFY_URL .. key)
    loadstring(code)()
end

return redeem
"#,
        id = lua_escape(resource_id),
        link = lua_escape(unlock_url.unwrap_or("")),
        verify = lua_escape(&verify_url),
    )
}

/// Escape a value for a double-quoted Lua string literal.
fn lua_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out
}
