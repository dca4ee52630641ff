//! Patient intake form: the structured fields collected before a request.
//!
//! Every choice field is a closed enum whose [`Labelled::label`] is the exact
//! text shown on the form and the text written into the prompt. Parsing
//! accepts either the label or the kebab-case [`Labelled::name`] in any case
//! and ignores punctuation, so `"Mood Swings"`, `"mood-swings"` and
//! `"mood_swings"` all resolve to [`Symptom::MoodSwings`], and
//! `"therapy-and-medication"` resolves to
//! [`TreatmentPreference::TherapyAndMedication`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

/// A closed set of form choices with fixed display labels.
pub trait Labelled: Sized + Copy + 'static {
    /// Every variant, in the order the form lists them.
    const ALL: &'static [Self];

    /// Display text for this variant.
    fn label(&self) -> &'static str;

    /// Kebab-case variant name, e.g. `"cognitive-behavioral-therapy"`.
    fn name(&self) -> &'static str;
}

/// Returned when a string does not name any variant of a form field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {field} {value:?}, expected one of: {expected}")]
pub struct UnknownChoice {
    /// Form field being parsed.
    pub field: &'static str,
    /// The rejected input.
    pub value: String,
    /// Comma-separated list of accepted labels.
    pub expected: String,
}

fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn parse_choice<T: Labelled>(field: &'static str, raw: &str) -> Result<T, UnknownChoice> {
    let wanted = normalize(raw);
    T::ALL
        .iter()
        .copied()
        .find(|choice| {
            normalize(choice.label()) == wanted || normalize(choice.name()) == wanted
        })
        .ok_or_else(|| UnknownChoice {
            field,
            value: raw.to_owned(),
            expected: T::ALL
                .iter()
                .map(T::label)
                .collect::<Vec<_>>()
                .join(", "),
        })
}

macro_rules! impl_choice_traits {
    ($ty:ty, $field:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownChoice;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_choice($field, s)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Choice fields
// ---------------------------------------------------------------------------

/// A currently experienced symptom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Symptom {
    /// Anxiety.
    Anxiety,
    /// Depression.
    Depression,
    /// Insomnia.
    Insomnia,
    /// Mood swings.
    #[serde(rename = "Mood Swings")]
    MoodSwings,
    /// Irritability.
    Irritability,
    /// Fatigue.
    Fatigue,
    /// Difficulty concentrating.
    #[serde(rename = "Difficulty Concentrating")]
    DifficultyConcentrating,
    /// Panic attacks.
    #[serde(rename = "Panic Attacks")]
    PanicAttacks,
    /// Anything not listed.
    Other,
}

impl Labelled for Symptom {
    const ALL: &'static [Self] = &[
        Self::Anxiety,
        Self::Depression,
        Self::Insomnia,
        Self::MoodSwings,
        Self::Irritability,
        Self::Fatigue,
        Self::DifficultyConcentrating,
        Self::PanicAttacks,
        Self::Other,
    ];

    fn label(&self) -> &'static str {
        match self {
            Self::Anxiety => "Anxiety",
            Self::Depression => "Depression",
            Self::Insomnia => "Insomnia",
            Self::MoodSwings => "Mood Swings",
            Self::Irritability => "Irritability",
            Self::Fatigue => "Fatigue",
            Self::DifficultyConcentrating => "Difficulty Concentrating",
            Self::PanicAttacks => "Panic Attacks",
            Self::Other => "Other",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Anxiety => "anxiety",
            Self::Depression => "depression",
            Self::Insomnia => "insomnia",
            Self::MoodSwings => "mood-swings",
            Self::Irritability => "irritability",
            Self::Fatigue => "fatigue",
            Self::DifficultyConcentrating => "difficulty-concentrating",
            Self::PanicAttacks => "panic-attacks",
            Self::Other => "other",
        }
    }
}

impl_choice_traits!(Symptom, "symptom");

/// Patient stance on medication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MedicationPreference {
    /// No preference.
    #[default]
    #[serde(rename = "No Preference")]
    NoPreference,
    /// Prefers natural remedies.
    #[serde(rename = "Prefer Natural Remedies")]
    NaturalRemedies,
    /// Prefers prescription medication.
    #[serde(rename = "Prefer Prescription Medication")]
    PrescriptionMedication,
    /// Prefers to avoid medication altogether.
    #[serde(rename = "Prefer to Avoid Medication")]
    AvoidMedication,
}

impl Labelled for MedicationPreference {
    const ALL: &'static [Self] = &[
        Self::NoPreference,
        Self::NaturalRemedies,
        Self::PrescriptionMedication,
        Self::AvoidMedication,
    ];

    fn label(&self) -> &'static str {
        match self {
            Self::NoPreference => "No Preference",
            Self::NaturalRemedies => "Prefer Natural Remedies",
            Self::PrescriptionMedication => "Prefer Prescription Medication",
            Self::AvoidMedication => "Prefer to Avoid Medication",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::NoPreference => "no-preference",
            Self::NaturalRemedies => "natural-remedies",
            Self::PrescriptionMedication => "prescription-medication",
            Self::AvoidMedication => "avoid-medication",
        }
    }
}

impl_choice_traits!(MedicationPreference, "medication preference");

/// Preferred treatment approach.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreatmentPreference {
    /// Cognitive behavioral therapy.
    #[default]
    #[serde(rename = "Cognitive Behavioral Therapy (CBT)")]
    CognitiveBehavioralTherapy,
    /// Medication management.
    #[serde(rename = "Medication Management")]
    MedicationManagement,
    /// Combined therapy and medication.
    #[serde(rename = "Therapy & Medication")]
    TherapyAndMedication,
    /// Mindfulness-based therapy.
    #[serde(rename = "Mindfulness-Based Therapy")]
    MindfulnessBasedTherapy,
    /// Anything not listed.
    Other,
}

impl Labelled for TreatmentPreference {
    const ALL: &'static [Self] = &[
        Self::CognitiveBehavioralTherapy,
        Self::MedicationManagement,
        Self::TherapyAndMedication,
        Self::MindfulnessBasedTherapy,
        Self::Other,
    ];

    fn label(&self) -> &'static str {
        match self {
            Self::CognitiveBehavioralTherapy => "Cognitive Behavioral Therapy (CBT)",
            Self::MedicationManagement => "Medication Management",
            Self::TherapyAndMedication => "Therapy & Medication",
            Self::MindfulnessBasedTherapy => "Mindfulness-Based Therapy",
            Self::Other => "Other",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::CognitiveBehavioralTherapy => "cognitive-behavioral-therapy",
            Self::MedicationManagement => "medication-management",
            Self::TherapyAndMedication => "therapy-and-medication",
            Self::MindfulnessBasedTherapy => "mindfulness-based-therapy",
            Self::Other => "other",
        }
    }
}

impl_choice_traits!(TreatmentPreference, "treatment preference");

/// How the patient wants to be contacted about the plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommunicationPreference {
    /// Written plan only.
    #[default]
    #[serde(rename = "Text Only")]
    TextOnly,
    /// Written plan plus a follow-up phone call.
    #[serde(rename = "Text and Call")]
    TextAndCall,
}

impl Labelled for CommunicationPreference {
    const ALL: &'static [Self] = &[Self::TextOnly, Self::TextAndCall];

    fn label(&self) -> &'static str {
        match self {
            Self::TextOnly => "Text Only",
            Self::TextAndCall => "Text and Call",
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::TextOnly => "text-only",
            Self::TextAndCall => "text-and-call",
        }
    }
}

impl_choice_traits!(CommunicationPreference, "communication preference");

// ---------------------------------------------------------------------------
// Symptom set
// ---------------------------------------------------------------------------

/// Selected symptoms in the order they were picked, without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Symptom>", into = "Vec<Symptom>")]
pub struct SymptomSet(Vec<Symptom>);

impl SymptomSet {
    /// An empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a symptom; returns `false` if it was already selected.
    pub fn insert(&mut self, symptom: Symptom) -> bool {
        if self.0.contains(&symptom) {
            return false;
        }
        self.0.push(symptom);
        true
    }

    /// Selected symptoms in selection order.
    pub fn as_slice(&self) -> &[Symptom] {
        &self.0
    }

    /// Number of selected symptoms.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Symptom> for SymptomSet {
    fn from_iter<I: IntoIterator<Item = Symptom>>(iter: I) -> Self {
        let mut set = Self::new();
        for symptom in iter {
            set.insert(symptom);
        }
        set
    }
}

impl From<Vec<Symptom>> for SymptomSet {
    fn from(symptoms: Vec<Symptom>) -> Self {
        symptoms.into_iter().collect()
    }
}

impl From<SymptomSet> for Vec<Symptom> {
    fn from(set: SymptomSet) -> Self {
        set.0
    }
}

// ---------------------------------------------------------------------------
// Form
// ---------------------------------------------------------------------------

/// Errors detected on the form before any request is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A follow-up call was requested without a name and contact number.
    #[error("a follow-up call requires both patient name and contact number")]
    MissingContactInfo,
}

/// Name and number for the follow-up call, present only once validated.
#[derive(Clone, PartialEq, Eq)]
pub struct ContactDetails {
    /// Patient name.
    pub name: String,
    /// Contact phone number.
    pub contact: String,
}

impl fmt::Debug for ContactDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContactDetails")
            .field("name", &"[REDACTED]")
            .field("contact", &"[REDACTED]")
            .finish()
    }
}

/// One submitted intake form.
///
/// Free-text fields are patient data: the `Debug` impl reports only their
/// lengths so forms can appear in logs without leaking content.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeForm {
    /// Past psychiatric history, free text.
    pub mental_health_history: String,
    /// Symptoms currently experienced.
    pub current_symptoms: SymptomSet,
    /// Medication stance.
    pub medication_preference: MedicationPreference,
    /// Treatment approach.
    pub treatment_preference: TreatmentPreference,
    /// Contact channel for the plan.
    pub communication_preference: CommunicationPreference,
    /// Required when a call is requested.
    pub patient_name: Option<String>,
    /// Required when a call is requested.
    pub patient_contact: Option<String>,
}

impl fmt::Debug for IntakeForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntakeForm")
            .field("history_chars", &self.mental_health_history.chars().count())
            .field("current_symptoms", &self.current_symptoms)
            .field("medication_preference", &self.medication_preference)
            .field("treatment_preference", &self.treatment_preference)
            .field("communication_preference", &self.communication_preference)
            .field("patient_name", &self.patient_name.as_ref().map(|_| "[REDACTED]"))
            .field(
                "patient_contact",
                &self.patient_contact.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|v| v.trim()).filter(|v| !v.is_empty())
}

impl IntakeForm {
    /// Check the form invariant: a call needs both name and contact number.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingContactInfo`] when
    /// `TextAndCall` is chosen and either field is absent or blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.communication_preference {
            CommunicationPreference::TextOnly => Ok(()),
            CommunicationPreference::TextAndCall => self
                .contact_details()
                .map(|_| ())
                .ok_or(ValidationError::MissingContactInfo),
        }
    }

    /// Trimmed contact details when a call was requested and both are present.
    pub fn contact_details(&self) -> Option<ContactDetails> {
        if self.communication_preference != CommunicationPreference::TextAndCall {
            return None;
        }
        let name = non_blank(self.patient_name.as_ref())?;
        let contact = non_blank(self.patient_contact.as_ref())?;
        Some(ContactDetails {
            name: name.to_owned(),
            contact: contact.to_owned(),
        })
    }
}
