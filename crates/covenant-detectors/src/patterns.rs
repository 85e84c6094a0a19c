//! Compiled-in rule text.

pub(crate) const HEDGING: &str = r"(?i)\b(might|perhaps|possibly|probably|it seems|i think|i believe|may be|could be|not sure|arguably)\b";

pub(crate) const OVERCONFIDENCE: &str = r"(?i)\b(definitely|certainly|guaranteed|undoubtedly|without (a|any) doubt|absolutely|always works|100% (sure|certain|accurate)|zero risk)\b";

pub(crate) const FABRICATION: &str = r"(?i)\b(studies (show|have shown|prove)|research (shows|proves|confirms)|experts (agree|say)|it is (well[- ]known|a known fact)|statistics show|sources say|reportedly)\b";

pub(crate) const SELF_CORRECTION: &str = r"(?i)(\bactually,? i was wrong\b|\bi made (a|an) (mistake|error)\b|\bcorrection:|\blet me correct\b|\bi apologi[sz]e for (the|my) (error|mistake|confusion)\b|\bscratch that\b)";

pub(crate) const JAILBREAK: &str = r"(?i)(\bignore (all |any )?(previous|prior|above) (instructions|rules|prompts)\b|\bpretend (you are|to be)\b|\bdeveloper mode\b|\bdo anything now\b|\bjailbreak\b|\bwithout (any )?restrictions\b|\bbypass (your|the|all) (rules|filters|safety|guidelines)\b)";

pub(crate) const PROMPT_INJECTION: &str = r"(?i)(\bsystem prompt\b|</?\s*system\s*>|\byou are now\b|\bdisregard (the|all|any) (above|previous)\b|\bnew instructions\s*:|\boverride (your|the) (instructions|policy)\b|\breveal (your|the) (prompt|instructions)\b)";

pub(crate) const CITATION_CLAIM: &str = r"(?i)(§\s*\d+|\b(section|sec\.|article|regulation|reg\.)\s+\d+[\w.()-]*|\b(irc|cfr|usc)\b|u\.s\.c\.|\[\d+\]|https?://\S+|\bsource:\s*\S+)";

pub(crate) const AUTHORITY: &str = r"(?i)\b(according to|the law (requires|states|says)|regulations? (require|requires|state|states)|as required by|the (statute|code|irs|rules?) (requires|states|says|mandates)|is mandated by|legally required)\b";

pub(crate) const CLAIM_SECTION: &str = r"(?im)^\s*(?:[#>*-]+\s*)?(?:\*\*)?claim(?:\*\*)?\s*[:\-]";

pub(crate) const JUSTIFICATION_SECTION: &str =
    r"(?im)^\s*(?:[#>*-]+\s*)?(?:\*\*)?(?:justification|reasoning)(?:\*\*)?\s*[:\-]";

pub(crate) const CONFIDENCE_SECTION: &str =
    r"(?im)^\s*(?:[#>*-]+\s*)?(?:\*\*)?confidence(?:\s+level)?(?:\*\*)?\s*[:\-]";
