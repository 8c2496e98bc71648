//! Python helpers prepended to every generated code blob.

/// Available to every agent. Printing is how the answer reaches the host.
pub const FINAL_ANSWER: &str = r#"
def final_answer(answer):
    "Print the final answer for the user."
    print(answer)
"#;

/// Chart agent helpers: `explain_chart(ax)` prints a structured description
/// of a matplotlib chart (type, labels, data and an ASCII rendering) that the
/// model reads back as its next observation.
pub const CHART_HELPERS: &str = r#"
def extract_chart_data(ax):
    import matplotlib.collections
    import matplotlib.patches
    import matplotlib.pyplot as plt

    max_data_length = 1000
    info = {
        "type": None,
        "title": ax.get_title(),
        "xlabel": ax.get_xlabel(),
        "ylabel": ax.get_ylabel(),
        "data": None,
        "ascii": None,
    }
    children = ax.get_children()

    if ax.get_lines():
        import plotille
        info["type"] = "LineChart"
        info["data"] = [
            {"label": line.get_label(), "data": line.get_xydata().tolist()}
            for line in ax.get_lines()
        ]
        rendered = ""
        for series in info["data"]:
            xs = [p[0] for p in series["data"]]
            ys = [p[1] for p in series["data"]]
            rendered += "Label: %s\n" % series["label"]
            rendered += plotille.plot(xs, ys, height=10, width=30) + "\n"
        info["ascii"] = rendered
    elif ax.patches and isinstance(ax.patches[0], plt.Rectangle) and not ax.images:
        info["type"] = "BarChart"
        bars = []
        for patch, tick in zip(ax.patches, ax.get_xticklabels()):
            bars.append({"label": str(tick.get_text()), "value": patch.get_height()})
        info["data"] = bars
        if bars:
            width = max(len(b["label"]) for b in bars)
            peak = max(abs(b["value"]) for b in bars) or 1
            info["ascii"] = "".join(
                "%s |%s %s\n" % (b["label"].ljust(width), "=" * int(abs(b["value"]) * 50 / peak), b["value"])
                for b in bars
            )
    elif ax.collections and isinstance(ax.collections[0], matplotlib.collections.PathCollection):
        import plotille
        info["type"] = "ScatterPlot"
        offsets = ax.collections[0].get_offsets()
        info["data"] = offsets.tolist()
        info["ascii"] = plotille.scatter(
            [p[0] for p in offsets], [p[1] for p in offsets], height=10, width=30
        )
    elif ax.images:
        info["type"] = "Heatmap"
        values = ax.images[0].get_array().data.tolist()
        x_labels = [t.get_text() for t in ax.get_xticklabels()]
        y_labels = [t.get_text() for t in ax.get_yticklabels()]
        info["data"] = {"values": values, "x_labels": x_labels, "y_labels": y_labels}
        rows = ["%s | %s" % (label, " | ".join("%.4f" % v for v in row)) for label, row in zip(y_labels, values)]
        info["ascii"] = "\n".join(["      | " + " | ".join(x_labels)] + rows)
    elif children and isinstance(children[0], matplotlib.patches.Wedge):
        info["type"] = "PieChart"
        texts = ax.texts
        pairs = [(texts[i].get_text(), texts[i + 1].get_text()) for i in range(0, len(texts) - 1, 2)]
        info["data"] = [{"label": l, "percentage": p} for l, p in pairs]
        info["ascii"] = "".join("Label: %s Value: %s\n" % pair for pair in pairs)
    else:
        info["type"] = "Unknown"
        info["ascii"] = (
            "Unable to describe this chart. If the chart only needed to be saved, that is done. "
            "Otherwise try a simpler chart or answer without it."
        )

    if len(str(info["data"])) > max_data_length:
        info["data"] = None
    return info


def format_chart_info(info):
    out = "\n-----------------------------------------------\n"
    out += "Type: %s\n" % info.get("type")
    if info.get("title"):
        out += "Title: %s\n" % info["title"]
    if info.get("xlabel"):
        out += "X-Axis Label: %s\n" % info["xlabel"]
    if info.get("ylabel"):
        out += "Y-Axis Label: %s\n" % info["ylabel"]
    if info.get("data"):
        out += "Plot Data: %s\n" % (info["data"],)
    if info.get("ascii"):
        out += "\nASCII Representation:\n" + info["ascii"]
    out += "\n-----------------------------------------------\n"
    return out


def explain_chart(target):
    try:
        ax = target.gca()
    except AttributeError:
        ax = target
    print(format_chart_info(extract_chart_data(ax)))
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_parsing::is_valid_python_syntax;

    #[test]
    fn test_helpers_are_valid_python() {
        assert!(is_valid_python_syntax(FINAL_ANSWER));
        assert!(is_valid_python_syntax(CHART_HELPERS));
        assert!(is_valid_python_syntax(&format!("{}\n{}", FINAL_ANSWER, CHART_HELPERS)));
    }
}
