use docx_patch_core::{wrap_bold_red, SubstitutionRule};

/// Turn user-supplied rules into the rules handed to the patcher.
///
/// With `literal`, find and replace texts are plain document text and get
/// escaped for the serialized XML. With `bold_red`, every replacement is
/// wrapped in emphasis markup after that escaping.
pub fn prepare_rules(
    rules: Vec<SubstitutionRule>,
    literal: bool,
    bold_red: bool,
) -> Vec<SubstitutionRule> {
    let rules: Vec<SubstitutionRule> = if literal {
        rules
            .iter()
            .map(|r| SubstitutionRule::literal(&r.find, &r.replacement))
            .collect()
    } else {
        rules
    };

    if !bold_red {
        return rules;
    }

    let replacements: Vec<&str> = rules.iter().map(|r| r.replacement.as_str()).collect();
    let formatted = wrap_bold_red(&replacements);
    rules
        .iter()
        .zip(formatted)
        .map(|(rule, replacement)| SubstitutionRule::new(rule.find.clone(), replacement))
        .collect()
}
