//! Minimal page shells. The dashboard pages only need to know which push
//! endpoint to open; the browser derives `ws://` or `wss://` from the scheme
//! the page itself was served over.

use axum::response::Html;

pub const LIVE_SOCKET_PATH: &str = "/refreshdata";
pub const HISTORY_SOCKET_PATH: &str = "/refreshhistory";

const PAGE_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>{{title}}</title>
  <link rel="stylesheet" href="/static/dashboard.css">
</head>
<body>
  <nav><a href="/">Live</a> | <a href="/history">History</a> | <a href="/log">Log</a></nav>
  <h1>{{title}}</h1>
  <pre id="payload">waiting for data...</pre>
  <script>
    const scheme = location.protocol === "https:" ? "wss://" : "ws://";
    const socket = new WebSocket(scheme + location.host + "{{socket_path}}");
    socket.onmessage = (event) => {
      document.getElementById("payload").textContent = event.data;
    };
    socket.onclose = (event) => {
      document.getElementById("payload").textContent += "\n[connection closed " + event.reason + "]";
    };
  </script>
</body>
</html>
"#;

fn render(title: &str, socket_path: &str) -> Html<String> {
    Html(
        PAGE_TEMPLATE
            .replace("{{title}}", title)
            .replace("{{socket_path}}", socket_path),
    )
}

pub fn home() -> Html<String> {
    render("Nest", LIVE_SOCKET_PATH)
}

pub fn history() -> Html<String> {
    render("Nest history", HISTORY_SOCKET_PATH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_point_at_their_socket() {
        let Html(home) = home();
        assert!(home.contains(r#""/refreshdata""#));
        assert!(!home.contains("{{"));

        let Html(history) = history();
        assert!(history.contains(r#""/refreshhistory""#));
        assert!(history.contains("<title>Nest history</title>"));
    }
}
