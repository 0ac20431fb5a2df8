//! Kiosk driver commands read from stdin, one per line.

use narration_core::prompts;

pub const HELP: &str = "\
comandos: welcome | start | leitor | nota <0-10> | paciente | responsavel |
          marcar <modalidade> | desmarcar <modalidade> | incompleto | enviar |
          audio on|off | cancel | say <texto> | voices | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KioskCommand {
    Welcome,
    Start,
    ReaderEnabled,
    Rating(u8),
    FillerPatient,
    FillerGuardian,
    Modality { label: String, checked: bool },
    MissingFields,
    Submit,
    Audio(bool),
    Cancel,
    Say(String),
    Voices,
    Help,
    Quit,
}

impl KioskCommand {
    /// Parse one input line; `Ok(None)` for blank lines.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((w, r)) => (w, r.trim()),
            None => (line, ""),
        };

        let cmd = match word.to_ascii_lowercase().as_str() {
            "welcome" | "inicio" => Self::Welcome,
            "start" | "iniciar" => Self::Start,
            "leitor" => Self::ReaderEnabled,
            "nota" => {
                let rating = rest
                    .parse::<u8>()
                    .ok()
                    .filter(|n| *n <= 10)
                    .ok_or_else(|| format!("nota inválida: '{}'", rest))?;
                Self::Rating(rating)
            }
            "paciente" => Self::FillerPatient,
            "responsavel" => Self::FillerGuardian,
            "marcar" | "desmarcar" => {
                if rest.is_empty() {
                    return Err(format!("{} requer uma modalidade", word));
                }
                Self::Modality {
                    label: rest.to_string(),
                    checked: word.eq_ignore_ascii_case("marcar"),
                }
            }
            "incompleto" => Self::MissingFields,
            "enviar" => Self::Submit,
            "audio" => match rest.to_ascii_lowercase().as_str() {
                "on" | "1" => Self::Audio(true),
                "off" | "0" => Self::Audio(false),
                other => return Err(format!("audio espera on|off, recebeu '{}'", other)),
            },
            "cancel" | "parar" => Self::Cancel,
            "say" | "falar" => {
                if rest.is_empty() {
                    return Err("say requer um texto".into());
                }
                Self::Say(rest.to_string())
            }
            "voices" => Self::Voices,
            "help" | "?" => Self::Help,
            "quit" | "exit" | "sair" => Self::Quit,
            other => return Err(format!("comando desconhecido: '{}'", other)),
        };
        Ok(Some(cmd))
    }

    /// Prompt narrated for this command, if it narrates one.
    pub fn prompt(&self) -> Option<String> {
        match self {
            Self::Welcome => Some(prompts::WELCOME.to_string()),
            Self::Start => Some(prompts::SURVEY_INTRO.to_string()),
            Self::ReaderEnabled => Some(prompts::READER_ENABLED.to_string()),
            Self::Rating(n) => Some(prompts::rating_selected(*n)),
            Self::FillerPatient => Some(prompts::FILLER_PATIENT.to_string()),
            Self::FillerGuardian => Some(prompts::FILLER_GUARDIAN.to_string()),
            Self::Modality { label, checked } => Some(prompts::modality_toggled(label, *checked)),
            Self::MissingFields => Some(prompts::MISSING_FIELDS.to_string()),
            Self::Submit => Some(prompts::SUBMITTED.to_string()),
            Self::Say(text) => Some(text.clone()),
            Self::Audio(_) | Self::Cancel | Self::Voices | Self::Help | Self::Quit => None,
        }
    }
}
