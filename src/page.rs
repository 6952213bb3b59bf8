//! Control page served on `GET /`

pub const INDEX_HTML: &str = concat!(
    "<!DOCTYPE html>",
    "<html>",
    "<head>",
    "<meta charset=\"utf-8\">",
    "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">",
    "<title>RGB LED Control</title>",
    "</head>",
    "<body>",
    "<h2>RGB LED Control</h2>",
    "<p>Values above 60 are capped to keep the strip dim.</p>",
    "<form action=\"/set_color\" method=\"POST\">",
    "  <label for=\"red\">Red (0-60):</label><br>",
    "  <input type=\"number\" id=\"red\" name=\"red\" min=\"0\" max=\"255\"><br>",
    "  <label for=\"green\">Green (0-60):</label><br>",
    "  <input type=\"number\" id=\"green\" name=\"green\" min=\"0\" max=\"255\"><br>",
    "  <label for=\"blue\">Blue (0-60):</label><br>",
    "  <input type=\"number\" id=\"blue\" name=\"blue\" min=\"0\" max=\"255\"><br><br>",
    "  <input type=\"submit\" value=\"Set Color\">",
    "</form>",
    "</body>",
    "</html>",
);
