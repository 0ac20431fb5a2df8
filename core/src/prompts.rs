//! Portuguese prompts narrated by the survey kiosk.

pub const WELCOME: &str = "Bem-vindo à Pesquisa de satisfação do Centro Especializado em Reabilitação CER 4 APAE Colinas. Toque em Iniciar Pesquisa.";
pub const CONFIRM: &str = "Iniciando pesquisa...";
pub const READER_ENABLED: &str = "Leitor de voz ativado. Toque nos textos para ouvir.";
pub const SURVEY_INTRO: &str =
    "Iniciando pesquisa de satisfação. Por favor, preencha a identificação abaixo.";
pub const MISSING_FIELDS: &str = "Atenção. Existem campos obrigatórios não preenchidos. Verifique o CPF e quem está preenchendo.";
pub const SUBMITTED: &str = "Pesquisa enviada com sucesso! Muito obrigado pela sua colaboração.";
pub const FILLER_PATIENT: &str = "Próprio paciente selecionado";
pub const FILLER_GUARDIAN: &str = "Responsável selecionado";

pub fn rating_selected(rating: u8) -> String {
    format!("Nota {} selecionada.", rating)
}

pub fn modality_toggled(label: &str, checked: bool) -> String {
    let action = if checked { "marcado" } else { "desmarcado" };
    format!("{} {}", label, action)
}
